//! The assignment-time, seek-capable partition handle.

use std::cell::Cell;

use crate::topic_partition::TopicPartition;

/// Where a [`SeekablePartition`] should move its consumption position to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekPosition {
    /// Seek to the earliest available offset.
    Beginning,
    /// Seek to the next offset that will be produced.
    End,
    /// Seek to an explicit offset.
    Offset(i64),
}

/// The seek-capable partition handle exposed to
/// `on_partitions_assigned` callbacks.
///
/// Instances only ever exist for the duration of the assignment callback:
/// the event loop calls the callback with `&[SeekablePartition]` and reads
/// back any pending seek immediately afterwards, still on the same thread.
/// There is deliberately no way to store a `SeekablePartition` past the
/// callback's return — the borrow checker enforces what the distilled spec
/// otherwise needed a runtime `ClosedResourceAccess` check for.
pub struct SeekablePartition {
    topic_partition: TopicPartition,
    position: i64,
    pending: Cell<Option<SeekPosition>>,
}

impl SeekablePartition {
    /// Construct a handle for the given partition, currently positioned at
    /// `position`. Only the receiver crate's event loop should call this.
    #[must_use]
    pub const fn new(topic_partition: TopicPartition, position: i64) -> Self {
        Self {
            topic_partition,
            position,
            pending: Cell::new(None),
        }
    }

    /// The partition this handle controls.
    #[must_use]
    pub const fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    /// The position this partition was assigned at, before any seek
    /// recorded during this callback is applied.
    #[must_use]
    pub const fn position(&self) -> i64 {
        self.position
    }

    /// Record a seek to the beginning of the partition.
    pub fn seek_to_beginning(&self) {
        self.pending.set(Some(SeekPosition::Beginning));
    }

    /// Record a seek to the end of the partition.
    pub fn seek_to_end(&self) {
        self.pending.set(Some(SeekPosition::End));
    }

    /// Record a seek to an explicit offset.
    pub fn seek(&self, offset: i64) {
        self.pending.set(Some(SeekPosition::Offset(offset)));
    }

    /// Read back whatever seek was recorded during the callback. Called by
    /// the event loop only, after the callback returns.
    #[must_use]
    pub fn take_pending_seek(&self) -> Option<SeekPosition> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_seek_recorded_by_default() {
        let partition = SeekablePartition::new(TopicPartition::new("orders", 0), 10);
        assert_eq!(partition.take_pending_seek(), None);
    }

    #[test]
    fn last_seek_call_wins() {
        let partition = SeekablePartition::new(TopicPartition::new("orders", 0), 10);
        partition.seek_to_beginning();
        partition.seek(5);
        assert_eq!(partition.take_pending_seek(), Some(SeekPosition::Offset(5)));
    }

    #[test]
    fn taking_clears_the_pending_seek() {
        let partition = SeekablePartition::new(TopicPartition::new("orders", 0), 10);
        partition.seek_to_end();
        assert_eq!(partition.take_pending_seek(), Some(SeekPosition::End));
        assert_eq!(partition.take_pending_seek(), None);
    }
}
