use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::kafka::error::{i32_len, CodecError, Result};
use crate::kafka::record::Record;
use crate::kafka::types::RecordArray;
use crate::kafka::{Encode, Serialize};

/// Record batch format version (the only one supported).
pub const MAGIC: i8 = 2;

/// Size of `base_offset` and `batch_length`, i.e., the part of a batch not counted in its
/// `batch_length`.
pub const LOG_OVERHEAD: usize = 8 + 4;

/// Size of the fields between `batch_length` and the start of the CRC-covered region
/// (`partition_leader_epoch`, `magic` and `crc`).
const CRC_PREFIX: usize = 4 + 1 + 4;

/// See official docs for [Record Batch](https://kafka.apache.org/documentation/#recordbatch).
///
/// Built with [`RecordBatch::builder`], which sizes all the records, fills in `batch_length` and
/// the `crc` and returns an immutable batch ready to be encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordBatch {
    base_offset: i64,
    batch_length: i32,
    partition_leader_epoch: i32,
    /// format version (current magic value is 2)
    magic: i8,
    crc: u32,
    attributes: RecordBatchAttrs,
    last_offset_delta: i32,
    base_timestamp: i64,
    max_timestamp: i64,
    producer_id: i64,
    producer_epoch: i16,
    base_sequence: i32,
    records_count: i32,
    records: Vec<Record>,
}

impl RecordBatch {
    #[inline]
    pub fn builder() -> RecordBatchBuilder {
        RecordBatchBuilder::default()
    }

    #[inline]
    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// Size of everything in the batch after the `batch_length` field itself.
    #[inline]
    pub fn batch_length(&self) -> i32 {
        self.batch_length
    }

    #[inline]
    pub fn partition_leader_epoch(&self) -> i32 {
        self.partition_leader_epoch
    }

    #[inline]
    pub fn magic(&self) -> i8 {
        self.magic
    }

    /// CRC-32C of the encoded bytes from `attributes` to the end of the batch.
    #[inline]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    #[inline]
    pub fn attributes(&self) -> RecordBatchAttrs {
        self.attributes
    }

    #[inline]
    pub fn last_offset_delta(&self) -> i32 {
        self.last_offset_delta
    }

    #[inline]
    pub fn base_timestamp(&self) -> i64 {
        self.base_timestamp
    }

    #[inline]
    pub fn max_timestamp(&self) -> i64 {
        self.max_timestamp
    }

    #[inline]
    pub fn producer_id(&self) -> i64 {
        self.producer_id
    }

    #[inline]
    pub fn producer_epoch(&self) -> i16 {
        self.producer_epoch
    }

    #[inline]
    pub fn base_sequence(&self) -> i32 {
        self.base_sequence
    }

    #[inline]
    pub fn records_count(&self) -> i32 {
        self.records_count
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Encode the part of the batch covered by the CRC (`attributes` through the last record).
    fn encode_crc_region<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        i16::from(self.attributes).encode(buf, version)?;
        self.last_offset_delta.encode(buf, version)?;
        self.base_timestamp.encode(buf, version)?;
        self.max_timestamp.encode(buf, version)?;
        self.producer_id.encode(buf, version)?;
        self.producer_epoch.encode(buf, version)?;
        self.base_sequence.encode(buf, version)?;
        self.records_count.encode(buf, version)?;
        RecordArray(self.records.as_slice()).encode(buf, version)
    }

    /// Checksum a throwaway encoding of the CRC region.
    fn checksum(&self, version: i16) -> Result<u32> {
        let size = self.encode_size(version) - LOG_OVERHEAD - CRC_PREFIX;
        let mut scratch = BytesMut::with_capacity(size);
        self.encode_crc_region(&mut scratch, version)?;
        Ok(crc32c::crc32c(&scratch))
    }
}

impl Serialize for RecordBatch {
    /// Static size of all the fields preceding the records.
    ///
    /// `SIZE = size(base_offset) + size(batch_length) + size(partition_leader_epoch)
    ///   + size(magic) + size(crc) + size(attributes) + size(last_offset_delta)
    ///   + size(base_timestamp) + size(max_timestamp) + size(producer_id)
    ///   + size(producer_epoch) + size(base_sequence) + size(records_count)`
    const SIZE: usize = 8 + 4 + 4 + 1 + 4 + 2 + 4 + 8 + 8 + 8 + 2 + 4 + 4;

    /// Note that this includes the varint length field of each record.
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        Self::SIZE + RecordArray(self.records.as_slice()).encode_size(version)
    }
}

impl Encode for RecordBatch {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.base_offset.encode(buf, version)?;
        self.batch_length.encode(buf, version)?;
        self.partition_leader_epoch.encode(buf, version)?;
        self.magic.encode(buf, version)?;
        self.crc.encode(buf, version)?;
        self.encode_crc_region(buf, version)
    }
}

#[derive(Debug)]
pub struct RecordBatchBuilder {
    base_offset: i64,
    partition_leader_epoch: i32,
    attributes: RecordBatchAttrs,
    last_offset_delta: Option<i32>,
    base_timestamp: Option<i64>,
    max_timestamp: Option<i64>,
    producer_id: i64,
    producer_epoch: i16,
    base_sequence: i32,
    records: Vec<Record>,
}

impl Default for RecordBatchBuilder {
    #[inline]
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            attributes: RecordBatchAttrs::default(),
            last_offset_delta: None,
            base_timestamp: None,
            max_timestamp: None,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: Vec::new(),
        }
    }
}

impl RecordBatchBuilder {
    #[inline]
    pub fn base_offset(mut self, base_offset: i64) -> Self {
        self.base_offset = base_offset;
        self
    }

    #[inline]
    pub fn partition_leader_epoch(mut self, partition_leader_epoch: i32) -> Self {
        self.partition_leader_epoch = partition_leader_epoch;
        self
    }

    #[inline]
    pub fn attributes(mut self, attributes: RecordBatchAttrs) -> Self {
        self.attributes = attributes;
        self
    }

    /// Defaults to the largest offset delta of the records (-1 if there are none).
    #[inline]
    pub fn last_offset_delta(mut self, last_offset_delta: i32) -> Self {
        self.last_offset_delta = Some(last_offset_delta);
        self
    }

    /// Timestamp of the first record, required.
    #[inline]
    pub fn base_timestamp(mut self, base_timestamp: i64) -> Self {
        self.base_timestamp = Some(base_timestamp);
        self
    }

    /// Defaults to `base_timestamp` plus the largest timestamp delta of the records.
    #[inline]
    pub fn max_timestamp(mut self, max_timestamp: i64) -> Self {
        self.max_timestamp = Some(max_timestamp);
        self
    }

    #[inline]
    pub fn producer_id(mut self, producer_id: i64) -> Self {
        self.producer_id = producer_id;
        self
    }

    #[inline]
    pub fn producer_epoch(mut self, producer_epoch: i16) -> Self {
        self.producer_epoch = producer_epoch;
        self
    }

    #[inline]
    pub fn base_sequence(mut self, base_sequence: i32) -> Self {
        self.base_sequence = base_sequence;
        self
    }

    #[inline]
    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    #[inline]
    pub fn records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.records.extend(records);
        self
    }

    /// Size the batch, derive `batch_length` and compute the `crc` over the finished records.
    pub fn build(self) -> Result<RecordBatch> {
        if self.attributes.compression != Compression::None {
            return Err(CodecError::UnsupportedCompression(
                self.attributes.compression,
            ));
        }

        let base_timestamp = self
            .base_timestamp
            .ok_or(CodecError::incomplete("RecordBatch", "base_timestamp"))?;

        let last_offset_delta = self.last_offset_delta.unwrap_or_else(|| {
            self.records
                .iter()
                .map(Record::offset_delta)
                .max()
                .unwrap_or(-1)
        });

        let max_timestamp = self.max_timestamp.unwrap_or_else(|| {
            let max_delta = self
                .records
                .iter()
                .map(Record::timestamp_delta)
                .max()
                .unwrap_or_default();
            base_timestamp.saturating_add(max_delta)
        });

        let mut batch = RecordBatch {
            base_offset: self.base_offset,
            batch_length: 0,
            partition_leader_epoch: self.partition_leader_epoch,
            magic: MAGIC,
            crc: 0,
            attributes: self.attributes,
            last_offset_delta,
            base_timestamp,
            max_timestamp,
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            base_sequence: self.base_sequence,
            records_count: i32_len("records count", self.records.len())?,
            records: self.records,
        };

        // batch_length counts everything after itself, i.e., all but base_offset and batch_length
        let size = batch.encode_size(MAGIC.into());
        batch.batch_length = i32_len("record batch length", size - LOG_OVERHEAD)?;

        batch.crc = batch.checksum(MAGIC.into())?;

        debug!(
            batch_length = batch.batch_length,
            crc = batch.crc,
            records = batch.records_count,
            "record batch finalized"
        );

        Ok(batch)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RecordBatchAttrs {
    /// bit 0~2
    pub compression: Compression,

    /// bit 3
    pub timestamp_type: TimestampType,

    /// bit 4
    pub is_transactional: bool,

    /// bit 5
    pub is_control: bool,

    /// bit 6
    ///
    /// `false` means [`base_timestamp`](RecordBatch::base_timestamp) is not set as the delete
    /// horizon for compaction.
    pub has_delete_horizon_ms: bool,
    // bit 7~15: unused
}

impl TryFrom<i16> for RecordBatchAttrs {
    type Error = CodecError;

    fn try_from(attributes: i16) -> Result<Self> {
        Ok(Self {
            compression: Compression::try_from(attributes)?,
            timestamp_type: TimestampType::from(attributes),
            is_transactional: (attributes & (1 << 4)) != 0,
            is_control: (attributes & (1 << 5)) != 0,
            has_delete_horizon_ms: (attributes & (1 << 6)) != 0,
        })
    }
}

impl From<RecordBatchAttrs> for i16 {
    fn from(attrs: RecordBatchAttrs) -> Self {
        let mut attributes = attrs.compression as i16;

        attributes |= (attrs.timestamp_type as i16) << 3;

        if attrs.is_transactional {
            attributes |= 1 << 4;
        }

        if attrs.is_control {
            attributes |= 1 << 5;
        }

        if attrs.has_delete_horizon_ms {
            attributes |= 1 << 6;
        }

        attributes
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None = 0,
    Gzip = 1,
    Snappy = 2,
    Lz4 = 3,
    Zstd = 4,
}

impl TryFrom<i16> for Compression {
    type Error = CodecError;

    fn try_from(attributes: i16) -> Result<Self> {
        Ok(match attributes & 0x7 {
            0 => Self::None,
            1 => Self::Gzip,
            2 => Self::Snappy,
            3 => Self::Lz4,
            4 => Self::Zstd,
            _ => return Err(CodecError::InvalidAttributes(attributes)),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TimestampType {
    #[default]
    Create = 0,
    LogAppend = 1,
}

impl From<i16> for TimestampType {
    #[inline]
    fn from(attributes: i16) -> Self {
        if (attributes & (1 << 3)) != 0 {
            Self::LogAppend
        } else {
            Self::Create
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::kafka::record::tests::feature_level_value;

    /// Value of a `TopicRecord` for topic `saz` found in cluster metadata logs.
    fn topic_value() -> Bytes {
        let mut val = Vec::with_capacity(24);
        val.extend_from_slice(b"\x01"); // frame version
        val.extend_from_slice(b"\x02"); // type
        val.extend_from_slice(b"\x00"); // version
        val.extend_from_slice(b"\x04"); // topic name length
        val.extend_from_slice(b"\x73\x61\x7a"); // topic name contents
                                                // topic UUID
        val.extend_from_slice(b"\x00\x00\x00\x00\x00\x00\x40\x00\x80\x00\x00\x00\x00\x00\x00\x91");
        val.extend_from_slice(b"\x00"); // tagged_fields
        Bytes::from(val)
    }

    /// Value of a `PartitionRecord` for partition `partition_id` of topic `saz`.
    fn partition_value(partition_id: &[u8; 4]) -> Bytes {
        let mut val = Vec::with_capacity(65);
        val.extend_from_slice(b"\x01"); // frame version
        val.extend_from_slice(b"\x03"); // type
        val.extend_from_slice(b"\x01"); // version
        val.extend_from_slice(partition_id); // partition_id
                                             // topic_id
        val.extend_from_slice(b"\x00\x00\x00\x00\x00\x00\x40\x00\x80\x00\x00\x00\x00\x00\x00\x91");
        val.extend_from_slice(b"\x02"); // length of replica array
        val.extend_from_slice(b"\x00\x00\x00\x01"); // replica array
        val.extend_from_slice(b"\x02"); // length of ISR array
        val.extend_from_slice(b"\x00\x00\x00\x01"); // ISR array
        val.extend_from_slice(b"\x01"); // length of removing replicas array
        val.extend_from_slice(b"\x01"); // length of adding replicas array
        val.extend_from_slice(b"\x00\x00\x00\x01"); // leader_id
        val.extend_from_slice(b"\x00\x00\x00\x00"); // leader_epoch
        val.extend_from_slice(b"\x00\x00\x00\x00"); // partition_epoch
        val.extend_from_slice(b"\x02"); // length of directories array
                                        // directory UUID
        val.extend_from_slice(b"\x10\x00\x00\x00\x00\x00\x40\x00\x80\x00\x00\x00\x00\x00\x00\x01");
        val.extend_from_slice(b"\x00"); // tagged_fields
        Bytes::from(val)
    }

    #[test]
    fn batch_attributes() {
        let attrs = RecordBatchAttrs {
            compression: Compression::Lz4,
            timestamp_type: TimestampType::LogAppend,
            is_transactional: true,
            is_control: false,
            has_delete_horizon_ms: false,
        };

        let encoded = i16::from(attrs);
        assert_eq!(encoded, 0b0001_1011);
        let decoded = RecordBatchAttrs::try_from(encoded).expect("valid attributes");
        assert_eq!(decoded, attrs);

        let attrs = RecordBatchAttrs::default();
        assert_eq!(i16::from(attrs), 0);

        let encoded = i16::from(RecordBatchAttrs {
            is_control: true,
            has_delete_horizon_ms: true,
            ..attrs
        });
        assert_eq!(encoded, 0b0110_0000);

        assert!(matches!(
            RecordBatchAttrs::try_from(0b0000_0111),
            Err(CodecError::InvalidAttributes(7))
        ));
    }

    #[test]
    fn crc32c_test_vectors() {
        assert_eq!(crc32c::crc32c(b""), 0x0000_0000);
        assert_eq!(crc32c::crc32c(b"a"), 0xC1D0_4330);
        assert_eq!(crc32c::crc32c(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn encode_single_record_batch() {
        let value = feature_level_value();

        let batch = RecordBatch::builder()
            .partition_leader_epoch(1)
            .base_timestamp(1726045943832)
            .record(Record::builder().value(value.clone()).build().expect("record"))
            .build()
            .expect("valid batch");

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x00\x00\x00\x00\x00\x00\x00\x00"); // base_offset
        expected.extend_from_slice(b"\x00\x00\x00\x4f"); // batch_length
        expected.extend_from_slice(b"\x00\x00\x00\x01"); // partition_leader_epoch
        expected.extend_from_slice(b"\x02"); // magic
        expected.extend_from_slice(b"\xb0\x69\x45\x7c"); // crc
        expected.extend_from_slice(b"\x00\x00"); // attributes
        expected.extend_from_slice(b"\x00\x00\x00\x00"); // last_offset_delta
        expected.extend_from_slice(b"\x00\x00\x01\x91\xe0\x5a\xf8\x18"); // base_timestamp
        expected.extend_from_slice(b"\x00\x00\x01\x91\xe0\x5a\xf8\x18"); // max_timestamp
        expected.extend_from_slice(b"\xff\xff\xff\xff\xff\xff\xff\xff"); // producer_id
        expected.extend_from_slice(b"\xff\xff"); // producer_epoch
        expected.extend_from_slice(b"\xff\xff\xff\xff"); // base_sequence
        expected.extend_from_slice(b"\x00\x00\x00\x01"); // records length
        expected.extend_from_slice(b"\x3a\x00\x00\x00\x01\x2e"); // record #1 up to value
        expected.extend_from_slice(&value); // value contents
        expected.extend_from_slice(b"\x00"); // headers array count

        assert_eq!(batch.batch_length(), 79);
        assert_eq!(batch.crc(), 2959689084);
        assert_eq!(batch.last_offset_delta(), 0);
        assert_eq!(batch.max_timestamp(), batch.base_timestamp());

        let actual = batch.to_bytes(MAGIC.into()).expect("encoded batch");
        assert_eq!(&actual[..], &expected[..]);
    }

    #[test]
    fn encode_multi_record_batch() {
        let values = [
            topic_value(),
            partition_value(b"\x00\x00\x00\x00"),
            partition_value(b"\x00\x00\x00\x01"),
        ];

        let records = values.iter().zip(0..).map(|(value, offset_delta)| {
            Record::builder()
                .offset_delta(offset_delta)
                .value(value.clone())
                .build()
                .expect("valid record")
        });

        let batch = RecordBatch::builder()
            .base_offset(1)
            .partition_leader_epoch(1)
            .base_timestamp(1726045957397)
            .records(records)
            .build()
            .expect("valid batch");

        assert_eq!(batch.records_count(), 3);
        assert_eq!(batch.last_offset_delta(), 2);
        assert_eq!(batch.batch_length(), 228);
        assert_eq!(batch.crc(), 618336989);

        let lengths: Vec<_> = batch.records().iter().map(Record::length).collect();
        assert_eq!(lengths, [30, 72, 72]);

        let encoded = batch.to_bytes(MAGIC.into()).expect("encoded batch");
        assert_eq!(encoded.len(), batch.batch_length() as usize + LOG_OVERHEAD);
        assert_eq!(&encoded[..8], b"\x00\x00\x00\x00\x00\x00\x00\x01");
        assert_eq!(&encoded[8..12], b"\x00\x00\x00\xe4");
        assert_eq!(&encoded[17..21], b"\x24\xdb\x12\xdd");
    }

    #[test]
    fn crc_covers_attributes_through_records() {
        let batch = RecordBatch::builder()
            .base_offset(42)
            .partition_leader_epoch(7)
            .base_timestamp(1_700_000_000_000)
            .producer_id(1000)
            .producer_epoch(3)
            .base_sequence(11)
            .record(
                Record::builder()
                    .timestamp_delta(5)
                    .key("k")
                    .value("v")
                    .build()
                    .expect("record"),
            )
            .build()
            .expect("valid batch");

        let encoded = batch.to_bytes(MAGIC.into()).expect("encoded batch");
        let crc = u32::from_be_bytes(encoded[17..21].try_into().expect("4 bytes"));

        assert_eq!(crc, batch.crc());
        assert_eq!(crc, crc32c::crc32c(&encoded[LOG_OVERHEAD + CRC_PREFIX..]));
        assert_eq!(batch.max_timestamp(), 1_700_000_000_005);
    }

    #[test]
    fn batch_length_excludes_base_offset_and_itself() {
        for n in [0, 1, 5] {
            let records = (0..n).map(|i| {
                Record::builder()
                    .offset_delta(i)
                    .value(Bytes::from(vec![b'x'; 10 * i as usize]))
                    .build()
                    .expect("record")
            });

            let batch = RecordBatch::builder()
                .base_timestamp(0)
                .records(records)
                .build()
                .expect("valid batch");

            let encoded = batch.to_bytes(MAGIC.into()).expect("encoded batch");
            assert_eq!(batch.batch_length() as usize, encoded.len() - 12);
            assert_eq!(batch.records_count(), n);
            assert_eq!(batch.last_offset_delta(), n - 1);
        }
    }

    #[test]
    fn incomplete_batch() {
        let err = RecordBatch::builder().build().expect_err("missing base timestamp");
        assert!(matches!(
            err,
            CodecError::IncompleteEntity {
                entity: "RecordBatch",
                field: "base_timestamp"
            }
        ));
    }

    #[test]
    fn compressed_batches_are_unsupported() {
        let err = RecordBatch::builder()
            .base_timestamp(0)
            .attributes(RecordBatchAttrs {
                compression: Compression::Zstd,
                ..Default::default()
            })
            .build()
            .expect_err("compression");

        assert!(matches!(
            err,
            CodecError::UnsupportedCompression(Compression::Zstd)
        ));
    }
}
