//! The inbound delivery type handed to downstream subscribers.

use crate::offset::OffsetHandle;
use crate::record::ConsumerRecord;

/// One inbound delivery: the record itself plus the offset handle used to
/// acknowledge or commit it.
pub struct ConsumerMessage<K, V> {
    record: ConsumerRecord<K, V>,
    offset: OffsetHandle,
}

impl<K, V> ConsumerMessage<K, V> {
    /// Construct a message. Only the receiver crate's event loop should call
    /// this.
    #[must_use]
    pub const fn new(record: ConsumerRecord<K, V>, offset: OffsetHandle) -> Self {
        Self { record, offset }
    }

    /// The delivered record (topic, partition, offset, key, value, headers,
    /// timestamp).
    #[must_use]
    pub const fn record(&self) -> &ConsumerRecord<K, V> {
        &self.record
    }

    /// The offset handle for this delivery.
    #[must_use]
    pub const fn offset(&self) -> &OffsetHandle {
        &self.offset
    }

    /// Decompose into the record and its offset handle.
    #[must_use]
    pub fn into_parts(self) -> (ConsumerRecord<K, V>, OffsetHandle) {
        (self.record, self.offset)
    }
}
