//! Sender and receiver configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::subscription::Subscription;

/// The four acknowledgement modes a receiver can be built with.
///
/// See the crate-level docs for the commit-trigger and redelivery-bound
/// tradeoffs of each mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckMode {
    /// Every record is auto-acknowledged on delivery; committed by batch/interval.
    AutoAck,
    /// The offset is committed *before* the record is delivered downstream.
    AtmostOnce,
    /// The application calls `acknowledge()`; committed by batch/interval.
    ManualAck,
    /// The application calls `commit()` explicitly; no automatic commits.
    ManualCommit,
}

/// Producer construction parameters.
///
/// `properties` is forwarded opaquely to `rdkafka::ClientConfig` (bootstrap
/// servers, acks, compression, batching, etc.); everything this crate itself
/// interprets is a named field.
#[derive(Clone, Debug)]
pub struct SenderConfig {
    /// Raw `rdkafka` client properties (`bootstrap.servers`, `acks`, ...).
    pub properties: HashMap<String, String>,
    /// Bound on how long `close()` waits for in-flight sends to drain.
    pub close_timeout: Duration,
}

impl SenderConfig {
    /// Start from an empty property map with a 5 second close timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            properties: HashMap::new(),
            close_timeout: Duration::from_secs(5),
        }
    }

    /// Set a raw client property (e.g. `"bootstrap.servers"`).
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Override the close timeout.
    #[must_use]
    pub const fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer construction parameters.
#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    /// Raw `rdkafka` client properties (`bootstrap.servers`, `group.id`, ...).
    pub properties: HashMap<String, String>,
    /// What to subscribe/assign to.
    pub subscription: Subscription,
    /// Bound on a single `poll` call.
    pub poll_timeout: Duration,
    /// Acknowledged-but-uncommitted record count that triggers a commit.
    pub commit_batch_size: usize,
    /// Elapsed time since the last commit that triggers a commit.
    pub commit_interval: Duration,
    /// Bound on how long `close()` waits for the final commit/shutdown.
    pub close_timeout: Duration,
    /// Maximum auto-commit retry attempts before failing the subscription.
    pub max_auto_commit_attempts: usize,
    /// Capacity of the channel between the event loop and the downstream
    /// stream; the crate's stand-in for a reactive-runtime scheduler's
    /// demand signal — free capacity is what backpressure is measured
    /// against.
    pub inbound_buffer: usize,
}

impl ReceiverConfig {
    /// Start from a subscription with the crate's defaults: a 250ms poll
    /// timeout, a commit batch size of 100, a 5 second commit interval, a 5
    /// second close timeout, 3 auto-commit retries, and a 256-message
    /// inbound buffer.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self {
            properties: HashMap::new(),
            subscription,
            poll_timeout: Duration::from_millis(250),
            commit_batch_size: 100,
            commit_interval: Duration::from_secs(5),
            close_timeout: Duration::from_secs(5),
            max_auto_commit_attempts: 3,
            inbound_buffer: 256,
        }
    }

    /// Set a raw client property (e.g. `"group.id"`).
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Override the poll timeout.
    #[must_use]
    pub const fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Override the commit batch size.
    #[must_use]
    pub const fn commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size;
        self
    }

    /// Override the commit interval.
    #[must_use]
    pub const fn commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Override the close timeout.
    #[must_use]
    pub const fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Override the maximum auto-commit retry attempts.
    #[must_use]
    pub const fn max_auto_commit_attempts(mut self, attempts: usize) -> Self {
        self.max_auto_commit_attempts = attempts;
        self
    }

    /// Override the inbound channel capacity.
    #[must_use]
    pub const fn inbound_buffer(mut self, capacity: usize) -> Self {
        self.inbound_buffer = capacity;
        self
    }
}
