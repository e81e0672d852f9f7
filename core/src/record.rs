//! Outbound records, broker acknowledgements, and inbound deliveries.

use std::time::SystemTime;

/// A single header entry attached to a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Header key.
    pub key: String,
    /// Header value (opaque bytes).
    pub value: Vec<u8>,
}

/// A user payload to publish.
///
/// `K` and `V` are the key/value types the caller already serialized into
/// bytes (or any `AsRef<[u8]>`-compatible representation); `T` is the
/// caller-chosen correlator type carried through to the matching
/// [`RecordMetadata`] response, unused for the fire-and-forget `send_all`
/// form.
#[derive(Clone, Debug)]
pub struct Record<K, V, T> {
    /// Destination topic.
    pub topic: String,
    /// Destination partition; `None` lets the producer's partitioner choose.
    pub partition: Option<i32>,
    /// Optional record key.
    pub key: Option<K>,
    /// Record value.
    pub value: V,
    /// Record headers.
    pub headers: Vec<Header>,
    /// Opaque correlator propagated to the response for this record.
    pub correlator: Option<T>,
}

impl<K, V, T> Record<K, V, T> {
    /// Build a record with no key, no headers, and no correlator.
    pub fn new(topic: impl Into<String>, value: V) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key: None,
            value,
            headers: Vec::new(),
            correlator: None,
        }
    }

    /// Attach a key.
    #[must_use]
    pub fn with_key(mut self, key: K) -> Self {
        self.key = Some(key);
        self
    }

    /// Pin the record to an explicit partition.
    #[must_use]
    pub const fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Attach a correlator propagated back with the response.
    #[must_use]
    pub fn with_correlator(mut self, correlator: T) -> Self {
        self.correlator = Some(correlator);
        self
    }
}

/// Broker-assigned placement of a successfully sent record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Destination topic.
    pub topic: String,
    /// Partition the broker placed the record in.
    pub partition: i32,
    /// Offset the broker assigned to the record.
    pub offset: i64,
    /// Broker-side timestamp, if available.
    pub timestamp: Option<i64>,
}

/// An inbound delivery as read off the broker.
#[derive(Clone, Debug)]
pub struct ConsumerRecord<K, V> {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset of this record within its partition.
    pub offset: i64,
    /// Broker-side timestamp, if present.
    pub timestamp: Option<SystemTime>,
    /// Record key, if present.
    pub key: Option<K>,
    /// Record value.
    pub value: V,
    /// Record headers.
    pub headers: Vec<Header>,
}

/// Partition metadata as returned by `partitions_for`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Topic name.
    pub topic: String,
    /// Partition number.
    pub partition: i32,
    /// Current leader broker id, if known.
    pub leader: Option<i32>,
}
