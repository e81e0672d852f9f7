//! Lazy, shared, once-only Kafka producer construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rdkafka::ClientConfig;
use rdkafka::producer::ThreadedProducer;
use reactive_kafka_core::error::SendError;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::delivery::DeliveryContext;

type Producer = ThreadedProducer<DeliveryContext>;

/// Holds at most one producer instance, built from the first caller's
/// properties and shared by every caller after that.
///
/// Mirrors the teacher's `hasProducer`-style flag, expressed here as an
/// `AtomicBool` guarding the one-time transition into the closed state, plus
/// a `tokio::sync::OnceCell` so a failed construction is cached and replayed
/// to every later caller instead of retried.
pub struct ProducerHandle {
    properties: std::collections::HashMap<String, String>,
    cell: OnceCell<Result<Arc<Producer>, Arc<SendError>>>,
    closed: AtomicBool,
}

impl ProducerHandle {
    /// Construct a handle that builds its producer lazily from `properties`.
    #[must_use]
    pub fn new(properties: std::collections::HashMap<String, String>) -> Self {
        Self {
            properties,
            cell: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Return the shared producer, constructing it on first call.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if `close` has already been called, or
    /// [`SendError::ProducerInit`] (cached and replayed to every caller) if
    /// construction failed.
    pub async fn get(&self) -> Result<Arc<Producer>, SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let result = self
            .cell
            .get_or_init(|| async {
                let mut config = ClientConfig::new();
                for (key, value) in &self.properties {
                    config.set(key, value);
                }
                match config.create_with_context(DeliveryContext::new()) {
                    Ok(producer) => {
                        info!("producer initialized");
                        Ok(Arc::new(producer))
                    }
                    Err(err) => {
                        warn!(error = %err, "producer initialization failed");
                        Err(Arc::new(SendError::ProducerInit(err.to_string())))
                    }
                }
            })
            .await;

        match result {
            Ok(producer) => Ok(Arc::clone(producer)),
            Err(err) => Err((**err).clone()),
        }
    }

    /// Mark the handle closed. Idempotent: a second call is a no-op.
    ///
    /// Does not itself wait for in-flight deliveries; callers bound that
    /// wait with their own timeout (see `KafkaSender::close`).
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_fails_with_missing_bootstrap_servers() {
        let handle = ProducerHandle::new(std::collections::HashMap::new());
        let result = handle.get().await;
        assert!(matches!(result, Err(SendError::ProducerInit(_))));
    }

    #[tokio::test]
    async fn failed_construction_is_cached_and_replayed() {
        let handle = ProducerHandle::new(std::collections::HashMap::new());
        let first = handle.get().await;
        let second = handle.get().await;
        assert!(first.is_err());
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_further_use() {
        let mut properties = std::collections::HashMap::new();
        properties.insert("bootstrap.servers".to_string(), "localhost:9092".to_string());
        let handle = ProducerHandle::new(properties);

        handle.close();
        handle.close();

        assert!(handle.is_closed());
        assert!(matches!(handle.get().await, Err(SendError::Closed)));
    }
}
