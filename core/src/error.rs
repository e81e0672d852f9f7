//! Error types for the sender, receiver, and offset subsystems.
//!
//! Grouped by failure domain rather than lumped into one enum, following the
//! `EventBusError`-style struct variants (failing resource plus a `reason`
//! string) used throughout the rest of the ecosystem.

use thiserror::Error;

/// Errors that can occur while sending records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The producer failed to construct; the sender is unusable.
    #[error("producer initialization failed: {0}")]
    ProducerInit(String),

    /// A record failed to reach the broker.
    #[error("delivery failed for topic '{topic}': {reason}")]
    Delivery {
        /// Topic the failing record targeted.
        topic: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// `partitions_for` failed.
    #[error("failed to fetch partitions for topic '{topic}': {reason}")]
    PartitionsFor {
        /// Topic queried.
        topic: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The sender was already closed.
    #[error("sender is closed")]
    Closed,
}

/// Errors surfaced to a receiver's subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    /// The underlying `poll` call failed.
    #[error("poll failed: {0}")]
    Poll(String),

    /// An `on_partitions_assigned`/`on_partitions_revoked` callback failed.
    #[error("assignment callback failed: {0}")]
    AssignmentCallback(String),

    /// Offset commit failed (see [`OffsetError`] for the retry bookkeeping).
    #[error("commit failed: {0}")]
    Commit(#[from] OffsetError),

    /// The receiver was already closed.
    #[error("receiver is closed")]
    Closed,
}

/// Errors from offset acknowledgement/commit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffsetError {
    /// A commit attempt failed.
    #[error("commit failed for {topic_partition} at offset {offset}: {reason}")]
    Commit {
        /// The partition the commit targeted.
        topic_partition: String,
        /// The offset that failed to commit.
        offset: i64,
        /// Human-readable failure reason.
        reason: String,
        /// Whether a retry is expected to succeed.
        retryable: bool,
    },

    /// Auto-commit retries were exhausted.
    #[error("auto-commit exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The last error encountered.
        last_error: String,
    },

    /// The event loop that owns the offset manager has shut down.
    #[error("offset manager is no longer reachable")]
    ManagerGone,
}
