//! Client side of the Kafka Produce API.
//!
//! The [`kafka`] module is a synchronous wire codec: entities are assembled by builders which
//! size them bottom-up (and checksum record batches), after which they encode top-down into a
//! buffer. The [`producer`] then writes complete requests to a broker connection.

pub use producer::{MessageWriter, Producer, ProducerError};
pub use properties::ProducerProperties;
pub use retry::Backoff;

pub mod kafka;
pub mod producer;
pub mod properties;
pub mod retry;
