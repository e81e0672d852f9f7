//! The outbound engine's public API.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use rdkafka::producer::Producer as _;
use reactive_kafka_core::config::SenderConfig;
use reactive_kafka_core::error::SendError;
use reactive_kafka_core::record::{PartitionInfo, Record, RecordMetadata};
use tokio::sync::oneshot;
use tracing::info;

use crate::producer_handle::ProducerHandle;
use crate::send_pipeline::{self, build_base_record};

/// Default bound on concurrent in-flight sends for `send_stream`/`send_all`.
const DEFAULT_MAX_INFLIGHT: usize = 64;

/// The outbound engine: a lazily-constructed, shared producer plus the
/// pipeline operators that drive it.
///
/// Cheap to clone — every clone shares the same underlying `ProducerHandle`,
/// so `close()` on one affects every other.
#[derive(Clone)]
pub struct KafkaSender {
    producer: Arc<ProducerHandle>,
}

impl KafkaSender {
    /// Construct a sender. The underlying producer is not built until the
    /// first send reaches it.
    #[must_use]
    pub fn new(config: SenderConfig) -> Self {
        info!("kafka sender constructed");
        Self {
            producer: Arc::new(ProducerHandle::new(config.properties)),
        }
    }

    /// Send a single record, resolving once the broker has acknowledged it
    /// (or a synchronous enqueue failure is known).
    ///
    /// # Errors
    ///
    /// Returns [`SendError::ProducerInit`]/[`SendError::Closed`] if the
    /// producer isn't usable, or [`SendError::Delivery`] if the record was
    /// rejected at enqueue time or by the broker.
    pub async fn send<K, V, T>(&self, record: Record<K, V, T>) -> Result<RecordMetadata, SendError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let producer = self.producer.get().await?;
        let key_bytes: Vec<u8> = record.key.as_ref().map(AsRef::as_ref).unwrap_or(&[]).to_vec();
        let payload_bytes: Vec<u8> = record.value.as_ref().to_vec();
        let (tx, rx) = oneshot::channel();
        let base = build_base_record(&record.topic, &payload_bytes, &key_bytes, record.partition, &record.headers).delivery_opaque(Box::new(tx));

        producer.send(base).map_err(|(err, _)| SendError::Delivery {
            topic: record.topic.clone(),
            reason: err.to_string(),
        })?;

        rx.await.unwrap_or(Err(SendError::Closed))
    }

    /// Send every item of `upstream`, resolving once upstream terminates and
    /// every dispatched send has resolved. Fails fast on the first delivery
    /// error, same as calling [`KafkaSender::send_stream_with`] with
    /// `delay_error = false` and discarding the per-item responses.
    ///
    /// # Errors
    ///
    /// Returns the first [`SendError`] encountered, if any.
    pub async fn send_all<K, V>(&self, upstream: impl Stream<Item = Record<K, V, ()>> + Send + 'static) -> Result<(), SendError>
    where
        K: AsRef<[u8]> + Send + 'static,
        V: AsRef<[u8]> + Send + 'static,
    {
        let mut responses = self.send_stream_with(upstream, DEFAULT_MAX_INFLIGHT, false);
        let mut first_error = None;
        while let Some((result, ())) = responses.next().await {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Send every item of `upstream`, emitting a matching `(result,
    /// correlator)` as each delivery resolves. Uses this crate's default
    /// in-flight bound and fail-fast semantics; see
    /// [`KafkaSender::send_stream_with`] for explicit control over both.
    pub fn send_stream<K, V, T>(
        &self,
        upstream: impl Stream<Item = Record<K, V, T>> + Send + 'static,
    ) -> Pin<Box<dyn Stream<Item = (Result<RecordMetadata, SendError>, T)> + Send>>
    where
        K: AsRef<[u8]> + Send + 'static,
        V: AsRef<[u8]> + Send + 'static,
        T: Default + Send + 'static,
    {
        self.send_stream_with(upstream, DEFAULT_MAX_INFLIGHT, false)
    }

    /// Send every item of `upstream`, bounding concurrent in-flight sends to
    /// `max_inflight` and, when `delay_error` is set, continuing to drain
    /// and emit error-marked responses rather than terminating on the first
    /// failure.
    pub fn send_stream_with<K, V, T>(
        &self,
        upstream: impl Stream<Item = Record<K, V, T>> + Send + 'static,
        max_inflight: usize,
        delay_error: bool,
    ) -> Pin<Box<dyn Stream<Item = (Result<RecordMetadata, SendError>, T)> + Send>>
    where
        K: AsRef<[u8]> + Send + 'static,
        V: AsRef<[u8]> + Send + 'static,
        T: Default + Send + 'static,
    {
        send_pipeline::drive(Arc::clone(&self.producer), upstream, max_inflight, delay_error)
    }

    /// Query partition metadata for `topic` from the broker's metadata
    /// cache. Runs on a blocking task, since `fetch_metadata` blocks its
    /// calling thread on network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::PartitionsFor`] if the metadata request fails or
    /// the producer is unusable.
    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<PartitionInfo>, SendError> {
        let producer = self.producer.get().await?;
        let topic = topic.to_string();
        let topic_on_panic = topic.clone();

        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Duration::from_secs(10))
                .map_err(|err| SendError::PartitionsFor {
                    topic: topic.clone(),
                    reason: err.to_string(),
                })
                .map(|metadata| {
                    metadata
                        .topics()
                        .iter()
                        .flat_map(|t| {
                            let topic_name = t.name().to_string();
                            t.partitions()
                                .iter()
                                .map(move |p| PartitionInfo {
                                    topic: topic_name.clone(),
                                    partition: p.id(),
                                    leader: (p.leader() >= 0).then_some(p.leader()),
                                })
                                .collect::<Vec<_>>()
                        })
                        .collect()
                })
        })
        .await
        .unwrap_or(Err(SendError::PartitionsFor {
            topic: topic_on_panic,
            reason: "partitions_for task panicked".to_string(),
        }))
    }

    /// Close the sender. Idempotent; every clone shares the same underlying
    /// flag, so further `send*` calls on any clone fail with
    /// [`SendError::Closed`].
    pub fn close(&self) {
        self.producer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_with_producer_init_when_unconfigured() {
        let sender = KafkaSender::new(SenderConfig::new());
        let record = Record::<&[u8], &[u8], ()>::new("orders", b"payload".as_slice());

        let result = sender.send(record).await;

        assert!(matches!(result, Err(SendError::ProducerInit(_))));
    }

    #[tokio::test]
    async fn send_after_close_fails_with_closed() {
        let sender = KafkaSender::new(SenderConfig::new().property("bootstrap.servers", "localhost:9092"));
        sender.close();

        let record = Record::<&[u8], &[u8], ()>::new("orders", b"payload".as_slice());
        let result = sender.send(record).await;

        assert!(matches!(result, Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn send_all_on_empty_stream_completes_ok() {
        let sender = KafkaSender::new(SenderConfig::new());
        let upstream = futures::stream::empty::<Record<&[u8], &[u8], ()>>();

        let result = sender.send_all(upstream).await;

        assert_eq!(result, Ok(()));
    }
}
