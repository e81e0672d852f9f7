//! Per-partition offset bookkeeping: acknowledged vs. committed, and the
//! batch/interval triggers that decide when an auto-commit is due.
//!
//! Deliberately has no `rdkafka` dependency and performs no I/O — the event
//! loop is the only thing that talks to the broker. Keeping this pure is
//! what makes the acknowledge/commit/batch-trigger logic testable without a
//! live consumer.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reactive_kafka_core::topic_partition::TopicPartition;

#[derive(Debug, Clone, Copy, Default)]
struct PartitionState {
    last_acknowledged: i64,
    last_committed: i64,
}

/// Tracks, per partition, the highest acknowledged and committed offsets,
/// and decides when enough has accumulated to justify a commit.
pub(crate) struct OffsetManager {
    partitions: BTreeMap<TopicPartition, PartitionState>,
    commit_batch_size: usize,
    commit_interval: Duration,
    last_commit_at: Instant,
}

impl OffsetManager {
    pub(crate) fn new(commit_batch_size: usize, commit_interval: Duration, now: Instant) -> Self {
        Self {
            partitions: BTreeMap::new(),
            commit_batch_size,
            commit_interval,
            last_commit_at: now,
        }
    }

    /// Start tracking a newly assigned partition at its current committed
    /// position (or `0` if the group has no prior commit).
    pub(crate) fn register_partition(&mut self, tp: TopicPartition, committed: i64) {
        self.partitions.entry(tp).or_insert(PartitionState {
            last_acknowledged: committed,
            last_committed: committed,
        });
    }

    /// Stop tracking a revoked partition, returning its last-known state so
    /// the caller can attempt a final commit before dropping it.
    pub(crate) fn remove_partition(&mut self, tp: &TopicPartition) -> Option<(i64, i64)> {
        self.partitions.remove(tp).map(|s| (s.last_acknowledged, s.last_committed))
    }

    /// `acknowledge(tp, offset)`: monotonic — `last_acknowledged` only ever
    /// moves forward.
    pub(crate) fn acknowledge(&mut self, tp: &TopicPartition, offset: i64) {
        if let Some(state) = self.partitions.get_mut(tp) {
            state.last_acknowledged = state.last_acknowledged.max(offset);
        }
    }

    /// Record that `offset` has now been confirmed committed for `tp`.
    pub(crate) fn record_committed(&mut self, tp: &TopicPartition, offset: i64, now: Instant) {
        if let Some(state) = self.partitions.get_mut(tp) {
            state.last_committed = state.last_committed.max(offset);
        }
        self.last_commit_at = now;
    }

    /// The partitions with acknowledged offsets ahead of their last commit,
    /// paired with the offset that should be committed for each.
    pub(crate) fn snapshot_for_commit(&self) -> Vec<(TopicPartition, i64)> {
        self.partitions
            .iter()
            .filter(|(_, state)| state.last_acknowledged > state.last_committed)
            .map(|(tp, state)| (tp.clone(), state.last_acknowledged))
            .collect()
    }

    /// Whether batch size or interval triggers a commit right now.
    pub(crate) fn commit_due(&self, now: Instant) -> bool {
        let pending: i64 = self
            .partitions
            .values()
            .map(|state| (state.last_acknowledged - state.last_committed).max(0))
            .sum();
        if pending == 0 {
            return false;
        }
        let batch_size = i64::try_from(self.commit_batch_size).unwrap_or(i64::MAX);
        pending >= batch_size || now.saturating_duration_since(self.last_commit_at) >= self.commit_interval
    }

    #[cfg(test)]
    pub(crate) fn last_acknowledged(&self, tp: &TopicPartition) -> Option<i64> {
        self.partitions.get(tp).map(|s| s.last_acknowledged)
    }

    #[cfg(test)]
    pub(crate) fn last_committed(&self, tp: &TopicPartition) -> Option<i64> {
        self.partitions.get(tp).map(|s| s.last_committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tp() -> TopicPartition {
        TopicPartition::new("orders", 0)
    }

    #[test]
    fn acknowledge_is_monotonic() {
        let mut manager = OffsetManager::new(100, Duration::from_secs(5), Instant::now());
        manager.register_partition(tp(), 0);

        manager.acknowledge(&tp(), 10);
        manager.acknowledge(&tp(), 3);

        assert_eq!(manager.last_acknowledged(&tp()), Some(10));
    }

    #[test]
    fn snapshot_only_includes_partitions_ahead_of_their_commit() {
        let mut manager = OffsetManager::new(100, Duration::from_secs(5), Instant::now());
        manager.register_partition(tp(), 0);
        manager.register_partition(TopicPartition::new("orders", 1), 0);

        manager.acknowledge(&tp(), 5);

        let snapshot = manager.snapshot_for_commit();
        assert_eq!(snapshot, vec![(tp(), 5)]);
    }

    #[test]
    fn commit_due_fires_on_batch_size() {
        let mut manager = OffsetManager::new(10, Duration::from_secs(3600), Instant::now());
        manager.register_partition(tp(), 0);

        manager.acknowledge(&tp(), 9);
        assert!(!manager.commit_due(Instant::now()));

        manager.acknowledge(&tp(), 10);
        assert!(manager.commit_due(Instant::now()));
    }

    #[test]
    fn commit_due_fires_on_interval_even_below_batch_size() {
        let past = Instant::now() - Duration::from_secs(10);
        let mut manager = OffsetManager::new(1000, Duration::from_secs(5), past);
        manager.register_partition(tp(), 0);
        manager.acknowledge(&tp(), 1);

        assert!(manager.commit_due(Instant::now()));
    }

    #[test]
    fn commit_due_is_false_with_nothing_pending() {
        let manager = OffsetManager::new(1, Duration::from_millis(1), Instant::now());
        assert!(!manager.commit_due(Instant::now()));
    }

    #[test]
    fn record_committed_advances_last_committed_and_resets_clock() {
        let mut manager = OffsetManager::new(10, Duration::from_secs(5), Instant::now());
        manager.register_partition(tp(), 0);
        manager.acknowledge(&tp(), 7);

        let now = Instant::now();
        manager.record_committed(&tp(), 7, now);

        assert_eq!(manager.last_committed(&tp()), Some(7));
        assert!(!manager.commit_due(now));
    }

    #[test]
    fn removing_a_partition_returns_its_last_state() {
        let mut manager = OffsetManager::new(10, Duration::from_secs(5), Instant::now());
        manager.register_partition(tp(), 0);
        manager.acknowledge(&tp(), 4);

        let removed = manager.remove_partition(&tp());
        assert_eq!(removed, Some((4, 0)));
        assert_eq!(manager.last_acknowledged(&tp()), None);
    }

    proptest! {
        /// Whatever order acknowledgements for a single partition arrive in,
        /// `last_acknowledged` ends up at the maximum offset seen — never
        /// regresses to an earlier one.
        #[test]
        fn acknowledge_never_regresses(offsets in prop::collection::vec(0i64..10_000, 1..50)) {
            let mut manager = OffsetManager::new(usize::MAX, Duration::from_secs(3600), Instant::now());
            manager.register_partition(tp(), 0);

            let mut expected_max = 0;
            for offset in offsets {
                expected_max = expected_max.max(offset);
                manager.acknowledge(&tp(), offset);
                prop_assert_eq!(manager.last_acknowledged(&tp()), Some(expected_max));
            }
        }
    }
}
