use bytes::{BufMut, Bytes};

use crate::kafka::error::{i32_len, Result};
use crate::kafka::types::{RecordArray, RecordBytes, VarInt, VarLong};
use crate::kafka::{Encode, Serialize};

pub use self::batch::{
    Compression, RecordBatch, RecordBatchAttrs, RecordBatchBuilder, TimestampType, MAGIC,
};

pub mod batch;

/// See official docs for [Record](https://kafka.apache.org/documentation/#record).
///
/// Records are immutable once built, so the cached `length` can never go stale. Use
/// [`Record::builder`] to construct one.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The length of the record calculated from the attributes field to the end of the record.
    length: VarInt,
    /// bit 0~7: unused
    attributes: i8,
    timestamp_delta: VarLong,
    offset_delta: VarInt,
    key_length: VarInt,
    key: RecordBytes,
    value_length: VarInt,
    value: RecordBytes,
    headers_count: VarInt,
    headers: Vec<Header>,
}

impl Record {
    #[inline]
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Encoded size of everything after the record's own length field.
    #[inline]
    pub fn length(&self) -> i32 {
        self.length.0
    }

    #[inline]
    pub fn attributes(&self) -> i8 {
        self.attributes
    }

    #[inline]
    pub fn timestamp_delta(&self) -> i64 {
        self.timestamp_delta.0
    }

    #[inline]
    pub fn offset_delta(&self) -> i32 {
        self.offset_delta.0
    }

    #[inline]
    pub fn key(&self) -> Option<&Bytes> {
        self.key.0.as_ref()
    }

    #[inline]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.0.as_ref()
    }

    #[inline]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn body_size(&self, version: i16) -> usize {
        self.attributes.encode_size(version)
            + self.timestamp_delta.encode_size(version)
            + self.offset_delta.encode_size(version)
            + self.key_length.encode_size(version)
            + self.key.encode_size(version)
            + self.value_length.encode_size(version)
            + self.value.encode_size(version)
            + self.headers_count.encode_size(version)
            + RecordArray(self.headers.as_slice()).encode_size(version)
    }
}

impl Serialize for Record {
    /// Includes the record's own varint length field.
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.length.encode_size(version) + self.length.0 as usize
    }
}

impl Encode for Record {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.length.encode(buf, version)?;
        self.attributes.encode(buf, version)?;
        self.timestamp_delta.encode(buf, version)?;
        self.offset_delta.encode(buf, version)?;
        self.key_length.encode(buf, version)?;
        self.key.encode(buf, version)?;
        self.value_length.encode(buf, version)?;
        self.value.encode(buf, version)?;
        self.headers_count.encode(buf, version)?;
        RecordArray(self.headers.as_slice()).encode(buf, version)
    }
}

#[derive(Debug, Default)]
pub struct RecordBuilder {
    attributes: i8,
    timestamp_delta: i64,
    offset_delta: i32,
    key: Option<Bytes>,
    value: Option<Bytes>,
    headers: Vec<Header>,
}

impl RecordBuilder {
    #[inline]
    pub fn attributes(mut self, attributes: i8) -> Self {
        self.attributes = attributes;
        self
    }

    /// Difference between the record timestamp and the batch `base_timestamp`.
    #[inline]
    pub fn timestamp_delta(mut self, timestamp_delta: i64) -> Self {
        self.timestamp_delta = timestamp_delta;
        self
    }

    /// Position of the record within its batch (the first record has delta 0).
    #[inline]
    pub fn offset_delta(mut self, offset_delta: i32) -> Self {
        self.offset_delta = offset_delta;
        self
    }

    #[inline]
    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[inline]
    pub fn value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[inline]
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    #[inline]
    pub fn headers(mut self, headers: impl IntoIterator<Item = Header>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Derive all the length fields and seal the record.
    pub fn build(self) -> Result<Record> {
        let key = RecordBytes(self.key);
        let value = RecordBytes(self.value);

        let mut record = Record {
            length: VarInt::default(),
            attributes: self.attributes,
            timestamp_delta: VarLong(self.timestamp_delta),
            offset_delta: VarInt(self.offset_delta),
            key_length: key.len_field()?,
            key,
            value_length: value.len_field()?,
            value,
            headers_count: VarInt(i32_len("record headers count", self.headers.len())?),
            headers: self.headers,
        };

        record.length = VarInt(i32_len("record length", record.body_size(0))?);

        Ok(record)
    }
}

/// See official docs for [Record Header](https://kafka.apache.org/documentation/#recordheader).
///
/// Both the key and the value are prefixed by a varint length, like the record key and value.
/// A null value has length -1.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    key_length: VarInt,
    key: RecordBytes,
    value_length: VarInt,
    value: RecordBytes,
}

impl Header {
    pub fn new(key: impl Into<String>, value: Option<Bytes>) -> Result<Self> {
        let key = RecordBytes(Some(Bytes::from(key.into())));
        let value = RecordBytes(value);

        Ok(Self {
            key_length: key.len_field()?,
            key,
            value_length: value.len_field()?,
            value,
        })
    }

    #[inline]
    pub fn key(&self) -> &str {
        // NOTE: constructed only from a `String`
        self.key
            .0
            .as_deref()
            .and_then(|key| std::str::from_utf8(key).ok())
            .unwrap_or_default()
    }

    #[inline]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.0.as_ref()
    }
}

impl Serialize for Header {
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.key_length.encode_size(version)
            + self.key.encode_size(version)
            + self.value_length.encode_size(version)
            + self.value.encode_size(version)
    }
}

impl Encode for Header {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.key_length.encode(buf, version)?;
        self.key.encode(buf, version)?;
        self.value_length.encode(buf, version)?;
        self.value.encode(buf, version)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Value of a `FeatureLevelRecord` for `metadata.version` found in cluster metadata logs.
    pub(crate) fn feature_level_value() -> Bytes {
        let mut val = Vec::with_capacity(23);
        val.extend_from_slice(b"\x01"); // frame version
        val.extend_from_slice(b"\x0c"); // type
        val.extend_from_slice(b"\x00"); // version
        val.extend_from_slice(b"\x11"); // name length & contents
        val.extend_from_slice(b"\x6d\x65\x74\x61\x64\x61\x74\x61\x2e\x76\x65\x72\x73\x69\x6f\x6e");
        val.extend_from_slice(b"\x00\x14"); // feature_level
        val.extend_from_slice(b"\x00"); // tagged_fields
        Bytes::from(val)
    }

    #[test]
    fn encode_record() {
        let value = feature_level_value();

        let record = Record::builder()
            .value(value.clone())
            .build()
            .expect("valid record");

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x3a"); // length
        expected.extend_from_slice(b"\x00"); // attributes
        expected.extend_from_slice(b"\x00"); // timestamp_delta
        expected.extend_from_slice(b"\x00"); // offset_delta
        expected.extend_from_slice(b"\x01"); // key length
        expected.extend_from_slice(b"\x2e"); // value length
        expected.extend_from_slice(&value); // value contents
        expected.extend_from_slice(b"\x00"); // headers array count

        assert_eq!(record.length(), 29);
        assert_eq!(record.encode_size(0), expected.len());

        let actual = record.to_bytes(0).expect("encoded record");
        assert_eq!(&actual[..], &expected[..]);
    }

    #[test]
    fn encode_record_with_key_and_value() {
        let record = Record::builder()
            .key("k")
            .value("v")
            .build()
            .expect("valid record");

        assert_eq!(record.length(), 8);
        assert_eq!(record.key().map(|k| &k[..]), Some(&b"k"[..]));
        assert_eq!(record.value().map(|v| &v[..]), Some(&b"v"[..]));

        let actual = record.to_bytes(0).expect("encoded record");
        assert_eq!(&actual[..], b"\x10\x00\x00\x00\x02k\x02v\x00");
    }

    #[test]
    fn encode_record_headers() {
        let header = Header::new("h", Some(Bytes::from_static(b"xy"))).expect("valid header");
        assert_eq!(header.key(), "h");
        assert_eq!(header.encode_size(0), 5);
        assert_eq!(&header.to_bytes(0).expect("header")[..], b"\x02h\x04xy");

        let null = Header::new("trace", None).expect("valid header");
        assert_eq!(null.value(), None);
        assert_eq!(&null.to_bytes(0).expect("header")[..], b"\x0atrace\x01");

        let record = Record::builder()
            .timestamp_delta(-1)
            .offset_delta(3)
            .value("v")
            .header(header)
            .header(null)
            .build()
            .expect("valid record");

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x00"); // attributes
        expected.extend_from_slice(b"\x01"); // timestamp_delta
        expected.extend_from_slice(b"\x06"); // offset_delta
        expected.extend_from_slice(b"\x01"); // key length (null)
        expected.extend_from_slice(b"\x02v"); // value
        expected.extend_from_slice(b"\x04"); // headers count
        expected.extend_from_slice(b"\x02h\x04xy"); // header #1
        expected.extend_from_slice(b"\x0atrace\x01"); // header #2

        assert_eq!(record.length() as usize, expected.len());
        assert_eq!(record.headers().len(), 2);

        let actual = record.to_bytes(0).expect("encoded record");
        assert_eq!(actual[0], (expected.len() as u8) << 1);
        assert_eq!(&actual[1..], &expected[..]);
    }

    #[test]
    fn record_length_excludes_length_field() {
        let big = Bytes::from(vec![0xab; 300]);

        let records = [
            Record::builder().build(),
            Record::builder().key(big.clone()).build(),
            Record::builder()
                .timestamp_delta(i64::MAX)
                .offset_delta(i32::MIN)
                .value(big)
                .header(Header::new("k", None).expect("header"))
                .build(),
        ];

        for record in records {
            let record = record.expect("valid record");
            let encoded = record.to_bytes(0).expect("encoded record");
            let prefix = VarInt(record.length()).encode_size(0);

            assert_eq!(encoded.len(), record.encode_size(0));
            assert_eq!(encoded.len() - prefix, record.length() as usize);
        }
    }
}
