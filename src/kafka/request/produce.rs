use std::str::FromStr;

use bytes::BufMut;
use tracing::debug;

use crate::kafka::error::{i32_len, CodecError, Result};
use crate::kafka::record::RecordBatch;
use crate::kafka::types::{Array, EmptyArray, Str};
use crate::kafka::{Encode, Serialize};

/// Number of acknowledgments the leader must receive before answering a produce request.
#[repr(i16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Acks {
    /// No response at all
    None = 0,
    /// Only the leader's log
    Leader = 1,
    /// The full ISR
    #[default]
    All = -1,
}

impl From<Acks> for i16 {
    #[inline]
    fn from(acks: Acks) -> Self {
        acks as i16
    }
}

impl TryFrom<i16> for Acks {
    type Error = String;

    fn try_from(acks: i16) -> Result<Self, Self::Error> {
        match acks {
            0 => Ok(Self::None),
            1 => Ok(Self::Leader),
            -1 => Ok(Self::All),
            other => Err(format!("unsupported acks: {other}")),
        }
    }
}

impl FromStr for Acks {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            other => other
                .parse::<i16>()
                .map_err(|e| format!("invalid acks '{other}': {e}"))
                .and_then(Self::try_from),
        }
    }
}

impl Serialize for Acks {
    const SIZE: usize = 2;

    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        Self::SIZE
    }
}

impl Encode for Acks {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        buf.put_i16((*self).into());
        Ok(())
    }
}

/// Produce request body (versions 3 to 8).
///
/// ```text
/// Produce Request (Version: 3-8) => transactional_id acks timeout_ms [topic_data]
///   transactional_id => NULLABLE_STRING
///   acks => INT16
///   timeout_ms => INT32
///   topic_data => name [partition_data]
///     name => STRING
///     partition_data => index records
///       index => INT32
///       records => RECORDS
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Produce {
    transactional_id: Option<Str>,
    acks: Acks,
    timeout_ms: i32,
    topic_data: Option<Vec<TopicProduceData>>,
}

impl Produce {
    #[inline]
    pub fn builder() -> ProduceBuilder {
        ProduceBuilder::default()
    }

    #[inline]
    pub fn transactional_id(&self) -> Option<&str> {
        self.transactional_id.as_ref().map(Str::as_str)
    }

    #[inline]
    pub fn acks(&self) -> Acks {
        self.acks
    }

    #[inline]
    pub fn timeout_ms(&self) -> i32 {
        self.timeout_ms
    }

    /// Topics to produce to (`None` if the array is encoded as null).
    #[inline]
    pub fn topic_data(&self) -> Option<&[TopicProduceData]> {
        self.topic_data.as_deref()
    }
}

impl Serialize for Produce {
    /// `SIZE = size(acks) + size(timeout_ms)`
    const SIZE: usize = 2 + 4;

    fn encode_size(&self, version: i16) -> usize {
        self.transactional_id.encode_size(version)
            + Self::SIZE
            + Array(self.topic_data.as_deref()).encode_size(version)
    }
}

impl Encode for Produce {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.transactional_id.encode(buf, version)?;
        self.acks.encode(buf, version)?;
        self.timeout_ms.encode(buf, version)?;
        Array(self.topic_data.as_deref()).encode(buf, version)
    }
}

#[derive(Debug)]
pub struct ProduceBuilder {
    transactional_id: Option<Str>,
    acks: Acks,
    timeout_ms: i32,
    empty_arrays: EmptyArray,
    topics: Vec<(Str, Vec<PartitionProduceData>)>,
}

impl Default for ProduceBuilder {
    #[inline]
    fn default() -> Self {
        Self {
            transactional_id: None,
            acks: Acks::default(),
            timeout_ms: 30_000,
            empty_arrays: EmptyArray::default(),
            topics: Vec::new(),
        }
    }
}

impl ProduceBuilder {
    #[inline]
    pub fn transactional_id(mut self, transactional_id: impl Into<Str>) -> Self {
        self.transactional_id = Some(transactional_id.into());
        self
    }

    #[inline]
    pub fn acks(mut self, acks: Acks) -> Self {
        self.acks = acks;
        self
    }

    #[inline]
    pub fn timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Encoding of the topic and partition arrays that end up with no items.
    #[inline]
    pub fn empty_arrays(mut self, empty_arrays: EmptyArray) -> Self {
        self.empty_arrays = empty_arrays;
        self
    }

    /// Add a topic, possibly with no partitions yet.
    pub fn topic(mut self, name: impl Into<Str>) -> Self {
        let name = name.into();
        if !self.topics.iter().any(|(topic, _)| *topic == name) {
            self.topics.push((name, Vec::new()));
        }
        self
    }

    /// Add a record batch for given topic partition.
    ///
    /// Topics keep the order in which they were first mentioned.
    pub fn partition(mut self, topic: impl Into<Str>, index: i32, records: RecordBatch) -> Self {
        let topic = topic.into();
        let data = PartitionProduceData::new(index, records);

        match self.topics.iter_mut().find(|(name, _)| *name == topic) {
            Some((_, partitions)) => partitions.push(data),
            None => self.topics.push((topic, vec![data])),
        }

        self
    }

    pub fn build(self) -> Result<Produce> {
        let empty_arrays = self.empty_arrays;

        let topic_data = self
            .topics
            .into_iter()
            .map(|(name, partitions)| TopicProduceData::new(name, partitions, empty_arrays))
            .collect::<Result<Vec<_>>>()?;

        let produce = Produce {
            transactional_id: self.transactional_id,
            acks: self.acks,
            timeout_ms: self.timeout_ms,
            topic_data: empty_arrays.apply(topic_data),
        };

        // NOTE: validates the counts of the nested arrays before anything gets encoded
        i32_len(
            "topic data length",
            produce.topic_data.as_ref().map_or(0, Vec::len),
        )?;

        debug!(
            topics = produce.topic_data.as_ref().map_or(0, Vec::len),
            acks = ?produce.acks,
            timeout_ms = produce.timeout_ms,
            "produce request body built"
        );

        Ok(produce)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicProduceData {
    name: Str,
    partition_data: Option<Vec<PartitionProduceData>>,
}

impl TopicProduceData {
    pub fn new(
        name: impl Into<Str>,
        partition_data: Vec<PartitionProduceData>,
        empty_arrays: EmptyArray,
    ) -> Result<Self> {
        let name = name.into();

        if name.len() > i16::MAX as usize {
            return Err(CodecError::overflow(
                "topic name length",
                name.len(),
                i16::MAX as usize,
            ));
        }

        i32_len("partition data length", partition_data.len())?;

        Ok(Self {
            name,
            partition_data: empty_arrays.apply(partition_data),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    pub fn partition_data(&self) -> Option<&[PartitionProduceData]> {
        self.partition_data.as_deref()
    }
}

impl Serialize for TopicProduceData {
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.name.encode_size(version) + Array(self.partition_data.as_deref()).encode_size(version)
    }
}

impl Encode for TopicProduceData {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.name.encode(buf, version)?;
        Array(self.partition_data.as_deref()).encode(buf, version)
    }
}

/// Record batch for a single partition.
///
/// The batch is written as NULLABLE_BYTES, i.e., prefixed by its total encoded size.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionProduceData {
    index: i32,
    records: RecordBatch,
}

impl PartitionProduceData {
    #[inline]
    pub fn new(index: i32, records: RecordBatch) -> Self {
        Self { index, records }
    }

    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    #[inline]
    pub fn records(&self) -> &RecordBatch {
        &self.records
    }
}

impl Serialize for PartitionProduceData {
    /// `SIZE = size(index) + size(records length)`
    const SIZE: usize = 4 + 4;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        Self::SIZE + self.records.encode_size(version)
    }
}

impl Encode for PartitionProduceData {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        self.index.encode(buf, version)?;
        i32_len("records length", self.records.encode_size(version))?.encode(buf, version)?;
        self.records.encode(buf, version)
    }
}
