//! How a receiver picks the topics/partitions it consumes.

use crate::topic_partition::TopicPartition;

/// The three ways a receiver can be told what to consume.
///
/// `Topics` and `Pattern` both go through normal consumer-group rebalancing;
/// `Assignment` bypasses group coordination entirely (the spec's "explicit
/// partition assignment" form).
#[derive(Clone, Debug)]
pub enum Subscription {
    /// Subscribe to an explicit list of topic names.
    Topics(Vec<String>),
    /// Subscribe to all topics matching a regular expression.
    Pattern(String),
    /// Assign directly to a fixed set of partitions, no group coordination.
    Assignment(Vec<TopicPartition>),
}
