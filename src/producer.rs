use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::kafka::types::Str;
use crate::kafka::{
    Acks, ApiKey, CodecError, EmptyArray, Encode as _, Produce, Record, RecordBatch,
    RequestHeader, RequestMessage,
};
use crate::properties::ProducerProperties;

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The request could not be built or encoded. Nothing has been written.
    #[error("failed to encode request")]
    Codec(#[from] CodecError),

    #[error("transport error")]
    Transport(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// An earlier write failed or timed out, possibly leaving a partial request on the
    /// connection. The producer must be dropped and the broker re-dialed.
    #[error("connection is broken by an earlier failed write")]
    Broken,
}

/// Writes complete requests to the underlying transport.
///
/// Each request is encoded into memory first, so an encoding error never leaves a partially
/// written request behind.
pub struct MessageWriter<W> {
    inner: BufWriter<W>,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    #[inline]
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::new(writer),
        }
    }

    /// Write the request and flush it, returning the number of bytes written.
    pub async fn write_request(&mut self, msg: &RequestMessage) -> Result<usize, ProducerError> {
        let buf = msg.to_bytes(msg.api_version())?;

        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;

        Ok(buf.len())
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Sends produce requests to a single broker without waiting for responses.
///
/// A write that fails or times out may leave part of a request on the connection, after which
/// every send fails with [`ProducerError::Broken`]. Recover by connecting a new producer.
pub struct Producer<W> {
    writer: MessageWriter<W>,
    client_id: Option<Str>,
    acks: Acks,
    api_version: i16,
    request_timeout: Duration,
    empty_arrays: EmptyArray,
    correlation_id: i32,
    broken: bool,
}

impl Producer<TcpStream> {
    /// Dial the bootstrap server, retrying failed attempts with exponential backoff.
    pub async fn connect(props: &ProducerProperties) -> Result<Self, ProducerError> {
        let addr = props.bootstrap_server.as_str();
        let setup_timeout = props.connection_setup_timeout;

        let stream = props
            .backoff()
            .retry(|attempt| async move {
                debug!(addr, attempt, "connecting to broker");

                let stream = timeout(setup_timeout, TcpStream::connect(addr))
                    .await
                    .map_err(|_| ProducerError::Timeout(setup_timeout))??;

                stream.set_nodelay(true)?;

                Ok::<_, ProducerError>(stream)
            })
            .await?;

        info!(addr, "connected to broker");

        Ok(Self::new(stream, props))
    }
}

impl<W> Producer<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(writer: W, props: &ProducerProperties) -> Self {
        Self {
            writer: MessageWriter::new(writer),
            client_id: props.client_id.clone().map(Str::from),
            acks: props.acks,
            api_version: props.api_version,
            request_timeout: props.request_timeout,
            empty_arrays: props.empty_arrays,
            correlation_id: 0,
            broken: false,
        }
    }

    /// Wrap a single record batch into a produce request with the next correlation id.
    pub fn build_request(
        &mut self,
        topic: &str,
        partition: i32,
        records: RecordBatch,
    ) -> Result<RequestMessage, CodecError> {
        let header = RequestHeader::new(
            ApiKey::Produce,
            self.api_version,
            self.correlation_id.wrapping_add(1),
            self.client_id.clone(),
        )?;

        let timeout_ms = i32::try_from(self.request_timeout.as_millis()).unwrap_or(i32::MAX);

        let body = Produce::builder()
            .acks(self.acks)
            .timeout_ms(timeout_ms)
            .empty_arrays(self.empty_arrays)
            .partition(topic.to_string(), partition, records)
            .build()?;

        let msg = RequestMessage::new(header, body.into())?;

        // only consume the correlation id once the request is complete
        self.correlation_id = msg.header().correlation_id;

        Ok(msg)
    }

    /// Whether an earlier write failed, i.e., the connection must not be used any more.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    #[inline]
    fn ensure_usable(&self) -> Result<(), ProducerError> {
        if self.broken {
            return Err(ProducerError::Broken);
        }
        Ok(())
    }

    /// Write the request within the configured request timeout.
    pub async fn send(&mut self, msg: &RequestMessage) -> Result<(), ProducerError> {
        self.ensure_usable()?;

        let written = timeout(self.request_timeout, self.writer.write_request(msg)).await;

        let n = match written {
            Ok(Ok(n)) => n,
            // NOTE: encoding fails before the first byte is written
            Ok(Err(e @ ProducerError::Codec(_))) => return Err(e),
            Ok(Err(e)) => {
                self.broken = true;
                warn!(error = %e, "write failed, connection is broken");
                return Err(e);
            }
            Err(_) => {
                self.broken = true;
                warn!(timeout = ?self.request_timeout, "write timed out, connection is broken");
                return Err(ProducerError::Timeout(self.request_timeout));
            }
        };

        info!(
            correlation_id = msg.header().correlation_id,
            size = n,
            "produce request sent"
        );

        Ok(())
    }

    /// Batch the records (timestamped now), then build and send a produce request for them.
    ///
    /// Returns the correlation id of the sent request.
    pub async fn produce(
        &mut self,
        topic: &str,
        partition: i32,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<i32, ProducerError> {
        self.ensure_usable()?;

        let batch = RecordBatch::builder()
            .base_timestamp(now_millis())
            .records(records)
            .build()?;

        debug!(
            topic,
            partition,
            records = batch.records_count(),
            batch_length = batch.batch_length(),
            "record batch ready"
        );

        let msg = self.build_request(topic, partition, batch)?;
        self.send(&msg).await?;

        Ok(msg.header().correlation_id)
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |t| i64::try_from(t.as_millis()).unwrap_or(i64::MAX))
}
