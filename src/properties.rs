use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::kafka::{Acks, EmptyArray};
use crate::retry::Backoff;

/// Producer configuration, a subset of the Java client's `producer.properties`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerProperties {
    /// The first entry of `bootstrap.servers`
    pub bootstrap_server: String,
    /// The `client.id` property
    pub client_id: Option<String>,
    /// The `acks` property (`all`, `-1`, `0` or `1`)
    pub acks: Acks,
    /// The `request.timeout.ms` property
    pub request_timeout: Duration,
    /// The `socket.connection.setup.timeout.ms` property
    pub connection_setup_timeout: Duration,
    /// The `api.version` property (Produce request version)
    pub api_version: i16,
    /// The `retries` property (total number of connection attempts)
    pub retries: u32,
    /// The `retry.backoff.ms` property
    pub retry_backoff: Duration,
    /// The `retry.backoff.max.ms` property
    pub retry_backoff_max: Duration,
    /// The `empty.arrays` property (`empty` or `null`)
    pub empty_arrays: EmptyArray,
}

impl ProducerProperties {
    /// Default properties for given bootstrap server address.
    pub fn new(bootstrap_server: impl Into<String>) -> Self {
        let backoff = Backoff::default();

        Self {
            bootstrap_server: bootstrap_server.into(),
            client_id: None,
            acks: Acks::default(),
            request_timeout: Duration::from_millis(30_000),
            connection_setup_timeout: Duration::from_millis(10_000),
            api_version: 7,
            retries: backoff.max_attempts,
            retry_backoff: backoff.base,
            retry_backoff_max: backoff.max,
            empty_arrays: EmptyArray::default(),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path).await?;
        Self::parse(BufReader::new(file)).await
    }

    pub async fn parse<R>(mut reader: R) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        let mut props = ProducerPropertiesBuilder::default();

        loop {
            line.clear();

            let n = reader
                .read_line(&mut line)
                .await
                .context("reading producer.properties line")?;

            if n == 0 {
                break props.build();
            }

            let line = line.trim();

            // skip comments and blank lines
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let value = value.trim();

            match key.trim() {
                "bootstrap.servers" => {
                    props.bootstrap_server = value
                        .split(',')
                        .map(str::trim)
                        .find(|server| !server.is_empty())
                        .map(String::from);
                }

                "client.id" if !value.is_empty() => props.client_id = Some(value.to_string()),

                "acks" => props.acks = Some(parse_value("acks", value)?),

                "request.timeout.ms" => {
                    props.request_timeout = Some(parse_millis("request.timeout.ms", value)?);
                }

                "socket.connection.setup.timeout.ms" => {
                    props.connection_setup_timeout = Some(parse_millis(
                        "socket.connection.setup.timeout.ms",
                        value,
                    )?);
                }

                "api.version" => props.api_version = Some(parse_value("api.version", value)?),

                "retries" => props.retries = Some(parse_value("retries", value)?),

                "retry.backoff.ms" => {
                    props.retry_backoff = Some(parse_millis("retry.backoff.ms", value)?);
                }

                "retry.backoff.max.ms" => {
                    props.retry_backoff_max = Some(parse_millis("retry.backoff.max.ms", value)?);
                }

                "empty.arrays" => props.empty_arrays = Some(parse_value("empty.arrays", value)?),

                // NOTE: other client properties are accepted but have no effect
                _ => continue,
            }
        }
    }

    /// Retry policy for establishing the broker connection.
    #[inline]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.retries,
            base: self.retry_backoff,
            max: self.retry_backoff_max,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow!("invalid {key} value '{value}': {e}"))
}

#[inline]
fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    parse_value(key, value).map(Duration::from_millis)
}

#[derive(Default)]
struct ProducerPropertiesBuilder {
    bootstrap_server: Option<String>,
    client_id: Option<String>,
    acks: Option<Acks>,
    request_timeout: Option<Duration>,
    connection_setup_timeout: Option<Duration>,
    api_version: Option<i16>,
    retries: Option<u32>,
    retry_backoff: Option<Duration>,
    retry_backoff_max: Option<Duration>,
    empty_arrays: Option<EmptyArray>,
}

impl ProducerPropertiesBuilder {
    fn build(self) -> Result<ProducerProperties> {
        let bootstrap_server = self
            .bootstrap_server
            .context("missing bootstrap.servers")?;

        let defaults = ProducerProperties::new(bootstrap_server);

        Ok(ProducerProperties {
            client_id: self.client_id,
            acks: self.acks.unwrap_or(defaults.acks),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            connection_setup_timeout: self
                .connection_setup_timeout
                .unwrap_or(defaults.connection_setup_timeout),
            api_version: self.api_version.unwrap_or(defaults.api_version),
            retries: self.retries.unwrap_or(defaults.retries),
            retry_backoff: self.retry_backoff.unwrap_or(defaults.retry_backoff),
            retry_backoff_max: self.retry_backoff_max.unwrap_or(defaults.retry_backoff_max),
            empty_arrays: self.empty_arrays.unwrap_or(defaults.empty_arrays),
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults() {
        let props = ProducerProperties::parse(&b"bootstrap.servers=localhost:9092\n"[..])
            .await
            .expect("valid properties");

        assert_eq!(props, ProducerProperties::new("localhost:9092"));
        assert_eq!(props.acks, Acks::All);
        assert_eq!(props.api_version, 7);
        assert_eq!(props.request_timeout, Duration::from_secs(30));
        assert_eq!(props.backoff(), Backoff::default());
    }

    #[tokio::test]
    async fn parse_all_properties() {
        let input = b"\
# producer settings
bootstrap.servers = broker-1:9092, broker-2:9092
client.id=my_kafka_client
acks=1

request.timeout.ms=900000
socket.connection.setup.timeout.ms=500
api.version=3
retries=5
retry.backoff.ms=100
retry.backoff.max.ms=2000
empty.arrays=null
compression.type=none
";

        let props = ProducerProperties::parse(&input[..])
            .await
            .expect("valid properties");

        assert_eq!(props.bootstrap_server, "broker-1:9092");
        assert_eq!(props.client_id.as_deref(), Some("my_kafka_client"));
        assert_eq!(props.acks, Acks::Leader);
        assert_eq!(props.request_timeout, Duration::from_secs(900));
        assert_eq!(props.connection_setup_timeout, Duration::from_millis(500));
        assert_eq!(props.api_version, 3);
        assert_eq!(props.empty_arrays, EmptyArray::Null);
        assert_eq!(
            props.backoff(),
            Backoff {
                max_attempts: 5,
                base: Duration::from_millis(100),
                max: Duration::from_secs(2),
            }
        );
    }

    #[tokio::test]
    async fn missing_bootstrap_servers() {
        let err = ProducerProperties::parse(&b"client.id=x\n"[..])
            .await
            .expect_err("missing bootstrap.servers");
        assert!(err.to_string().contains("bootstrap.servers"));
    }

    #[tokio::test]
    async fn invalid_value() {
        let input = b"bootstrap.servers=localhost:9092\nacks=2\n";
        let err = ProducerProperties::parse(&input[..])
            .await
            .expect_err("invalid acks");
        assert!(err.to_string().contains("invalid acks value '2'"));
    }

    #[tokio::test]
    async fn load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "kafka-producer-{}.properties",
            std::process::id()
        ));

        fs::write(&path, "bootstrap.servers=127.0.0.1:9092\nretries=1\n")
            .await
            .expect("write properties");

        let props = ProducerProperties::load(&path).await;
        let _ = fs::remove_file(&path).await;

        let props = props.expect("valid properties");
        assert_eq!(props.bootstrap_server, "127.0.0.1:9092");
        assert_eq!(props.retries, 1);
    }
}
