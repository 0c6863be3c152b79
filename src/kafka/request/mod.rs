use bytes::BufMut;

use crate::kafka::api::{ApiKey, ApiVersion};
use crate::kafka::error::{i32_len, CodecError, Result};
use crate::kafka::types::Str;
use crate::kafka::{Encode, HeaderVersion, Serialize};

pub use produce::{Acks, PartitionProduceData, Produce, ProduceBuilder, TopicProduceData};

pub mod produce;

#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    /// An integer identifying the request type. (API v0+)
    pub request_api_key: ApiKey,

    /// The version of the API to use for the request. (API v0+)
    pub request_api_version: ApiVersion,

    /// A unique identifier for the request. (API v0+)
    pub correlation_id: i32,

    /// A string identifying the client that sent the request. (API v1+)
    pub client_id: Option<Str>,
}

impl RequestHeader {
    pub fn new(
        request_api_key: ApiKey,
        api_version: i16,
        correlation_id: i32,
        client_id: Option<Str>,
    ) -> Result<Self> {
        if let Some(client_id) = &client_id {
            if client_id.len() > i16::MAX as usize {
                return Err(CodecError::overflow(
                    "client id length",
                    client_id.len(),
                    i16::MAX as usize,
                ));
            }
        }

        Ok(Self {
            request_api_key,
            request_api_version: ApiVersion::parse(request_api_key, api_version)?,
            correlation_id,
            client_id,
        })
    }

    /// Header version implied by the request's API key and version.
    #[inline]
    pub fn version(&self) -> i16 {
        self.request_api_key
            .header_version(self.request_api_version.into_inner())
    }
}

impl Serialize for RequestHeader {
    /// `SIZE = size(request_api_key) + size(request_api_version) + size(correlation_id)`
    const SIZE: usize = 2 + 2 + 4;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        match version {
            0 => Self::SIZE,
            _ => Self::SIZE + self.client_id.encode_size(version),
        }
    }
}

impl Encode for RequestHeader {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.request_api_key.encode(buf, version)?;
        self.request_api_version.encode(buf, version)?;
        self.correlation_id.encode(buf, version)?;

        if version >= 1 {
            self.client_id.encode(buf, version)?;
        }

        Ok(())
    }
}

/// A complete request: the size of what follows, the header and the body.
///
/// The `size` is derived from the finished header and body in [`RequestMessage::new`], so a
/// message is ready to be written as soon as it exists.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestMessage {
    size: i32,
    header: RequestHeader,
    body: RequestBody,
}

impl RequestMessage {
    pub fn new(header: RequestHeader, body: RequestBody) -> Result<Self> {
        if header.request_api_key != body.api_key() {
            return Err(CodecError::ApiKeyMismatch {
                header: header.request_api_key,
                body: body.api_key(),
            });
        }

        let api_version = header.request_api_version.into_inner();
        let size = header.encode_size(header.version()) + body.encode_size(api_version);

        Ok(Self {
            size: i32_len("request size", size)?,
            header,
            body,
        })
    }

    /// Size of the message excluding the size field itself.
    #[inline]
    pub fn size(&self) -> i32 {
        self.size
    }

    #[inline]
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    #[inline]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    #[inline]
    pub fn api_version(&self) -> i16 {
        self.header.request_api_version.into_inner()
    }
}

impl Serialize for RequestMessage {
    const SIZE: usize = 4;

    /// Note that both the header and body versions are given by the header, not by `version`.
    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        Self::SIZE + self.size as usize
    }
}

impl Encode for RequestMessage {
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        let version = self.api_version();

        self.size.encode(buf, version)?;
        self.header.encode(buf, self.header.version())?;
        self.body.encode(buf, version)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Produce(Produce),
}

impl RequestBody {
    #[inline]
    pub fn api_key(&self) -> ApiKey {
        match self {
            Self::Produce(_) => ApiKey::Produce,
        }
    }
}

impl From<Produce> for RequestBody {
    #[inline]
    fn from(body: Produce) -> Self {
        Self::Produce(body)
    }
}

impl Serialize for RequestBody {
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        match self {
            Self::Produce(body) => body.encode_size(version),
        }
    }
}

impl Encode for RequestBody {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        match self {
            Self::Produce(body) => body.encode(buf, version),
        }
    }
}
