use bytes::{Buf, BufMut, BytesMut};

pub use api::{ApiKey, ApiVersion};
pub use error::{CodecError, Result};
pub use record::{
    Compression, Header, Record, RecordBatch, RecordBatchAttrs, RecordBatchBuilder,
    RecordBuilder, TimestampType,
};
pub use request::{
    Acks, PartitionProduceData, Produce, ProduceBuilder, RequestBody, RequestHeader,
    RequestMessage, TopicProduceData,
};
pub use types::EmptyArray;

pub mod api;
pub mod error;
pub mod record;
pub mod request;
pub mod types;

/// Wire size of a protocol entity.
///
/// Sizes are pure arithmetic over already-populated fields and never encode anything, so that
/// outer length fields can be derived bottom-up before a single byte is written.
pub trait Serialize {
    /// Static part of the encoded size (e.g., the length prefix of a string).
    const SIZE: usize = 0;

    fn encode_size(&self, version: i16) -> usize;
}

pub trait Encode: Serialize {
    /// Append exactly [`encode_size`](Serialize::encode_size) bytes to `buf`.
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()>;

    /// Encode into a freshly allocated buffer of the exact size.
    fn to_bytes(&self, version: i16) -> Result<BytesMut> {
        let size = self.encode_size(version);
        let mut buf = BytesMut::with_capacity(size);
        self.encode(&mut buf, version)?;
        debug_assert_eq!(buf.len(), size, "encoded size differs from encode_size");
        Ok(buf)
    }
}

pub trait Deserialize: Sized {
    const DEFAULT_VERSION: i16 = 0;

    fn decode<B: Buf>(buf: &mut B, version: i16) -> Result<(Self, usize)>;

    #[inline]
    fn deserialize<B: Buf>(buf: &mut B) -> Result<(Self, usize)> {
        Self::decode(buf, Self::DEFAULT_VERSION)
    }
}

pub trait HeaderVersion {
    // NOTE: header version is generally different, but derivable from the API version
    fn header_version(&self, api_version: i16) -> i16;
}
