//! The outbound engine: subscribes to a stream of records, drives the
//! producer's async send, and emits a stream of broker acknowledgements.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use futures::stream::{FuturesUnordered, StreamExt};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{BaseRecord, Producer};
use reactive_kafka_core::error::SendError;
use reactive_kafka_core::record::{Record, RecordMetadata};
use tokio::sync::{Semaphore, oneshot};
use tracing::{error, warn};

use crate::producer_handle::ProducerHandle;

/// The pipeline's lifecycle, encoded as an explicit enum rather than
/// booleans scattered across the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineState {
    /// Constructed, no item dispatched or upstream-done signal seen yet.
    Init,
    /// Dispatching items; upstream still open.
    Active,
    /// Upstream has terminated; waiting for in-flight deliveries to drain.
    OutboundDone,
    /// Drained with no unrecovered error.
    Complete,
    /// Drained (or short-circuited) with an unrecovered error.
    Failed,
}

/// The pure state-machine core of [`SendPipeline`], isolated from I/O so it
/// can be driven and asserted on directly in tests without a producer.
pub(crate) struct PipelineCore {
    state: PipelineState,
    inflight: usize,
    delay_error: bool,
    first_error: Option<SendError>,
}

impl PipelineCore {
    pub(crate) const fn new(delay_error: bool) -> Self {
        Self {
            state: PipelineState::Init,
            inflight: 0,
            delay_error,
            first_error: None,
        }
    }

    pub(crate) const fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) const fn inflight(&self) -> usize {
        self.inflight
    }

    fn enter_active(&mut self) {
        if matches!(self.state, PipelineState::Init) {
            self.state = PipelineState::Active;
        }
    }

    /// Call before dispatching an upstream item. Returns `false` if the item
    /// should be dropped because the pipeline already reached a terminal
    /// state (a dispatch arriving after `Complete`/`Failed`).
    pub(crate) fn begin_dispatch(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.enter_active();
        self.inflight += 1;
        true
    }

    fn record_error(&mut self, err: SendError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    /// Call once a dispatched item's delivery (success or failure) resolves.
    /// Returns the pipeline's finalized outcome if this delivery was the one
    /// that drained the pipeline, `None` otherwise.
    pub(crate) fn complete_delivery(&mut self, result: &Result<(), SendError>) -> Option<Result<(), SendError>> {
        self.inflight = self.inflight.saturating_sub(1);

        if self.is_terminal() {
            // This delivery was already in flight when a prior one
            // (fail-fast) or the drain (delay-error) finalized the pipeline.
            return None;
        }

        if let Err(err) = result {
            self.record_error(err.clone());
            if !self.delay_error {
                self.state = PipelineState::Failed;
                return self.first_error.clone().map(Err);
            }
        }

        self.maybe_finalize()
    }

    /// Call when upstream terminates with no more items.
    pub(crate) fn upstream_done(&mut self) -> Option<Result<(), SendError>> {
        self.enter_active();
        if !matches!(self.state, PipelineState::Failed) {
            self.state = PipelineState::OutboundDone;
        }
        self.maybe_finalize()
    }

    /// Call when upstream itself errors (no send was attempted for this item).
    pub(crate) fn upstream_failed(&mut self) {
        self.state = PipelineState::Failed;
    }

    fn maybe_finalize(&mut self) -> Option<Result<(), SendError>> {
        if self.state == PipelineState::OutboundDone && self.inflight == 0 {
            let outcome = self.first_error.clone().map_or(Ok(()), Err);
            self.state = if outcome.is_ok() { PipelineState::Complete } else { PipelineState::Failed };
            Some(outcome)
        } else {
            None
        }
    }

    pub(crate) const fn is_terminal(&self) -> bool {
        matches!(self.state, PipelineState::Complete | PipelineState::Failed)
    }
}

/// Log the pipeline's terminal outcome, if this call was the one that
/// produced it. A no-op for `None` (pipeline still draining) and for
/// `Some(Ok(()))` (clean completion needs no error log).
fn log_if_terminal_failure(outcome: &Option<Result<(), SendError>>) {
    if let Some(Err(err)) = outcome {
        error!(error = %err, "outbound pipeline terminated with an unrecovered error");
    }
}

/// Build a `BaseRecord` from the pieces of a `Record` that matter to
/// librdkafka. Takes loose fields rather than a whole `Record` because the
/// key is pre-flattened to bytes (absent keys become an empty byte key, not
/// a null key, since `BaseRecord`'s builder fixes its key type at the call
/// site) and the correlator never reaches the wire at all.
pub(crate) fn build_base_record<'a>(
    topic: &'a str,
    payload: &'a [u8],
    key_bytes: &'a [u8],
    partition: Option<i32>,
    headers: &'a [reactive_kafka_core::record::Header],
) -> BaseRecord<'a, [u8], [u8], crate::delivery::DeliveryOpaque> {
    let mut base = BaseRecord::to(topic).payload(payload).key(key_bytes);

    if let Some(partition) = partition {
        base = base.partition(partition);
    }

    if !headers.is_empty() {
        let mut owned = OwnedHeaders::new();
        for header in headers {
            owned = owned.insert(Header {
                key: &header.key,
                value: Some(&header.value),
            });
        }
        base = base.headers(owned);
    }

    base
}

/// Drive `upstream` through `producer`'s send path, bounding concurrent
/// in-flight sends to `max_inflight` and applying `delay_error` semantics.
///
/// Absent correlators (`record.correlator == None`) are paired with
/// `T::default()` on the way out, since every item emitted from the
/// streaming form must carry *some* correlator value.
pub(crate) fn drive<K, V, T>(
    producer: Arc<ProducerHandle>,
    upstream: impl Stream<Item = Record<K, V, T>> + Send + 'static,
    max_inflight: usize,
    delay_error: bool,
) -> Pin<Box<dyn Stream<Item = (Result<RecordMetadata, SendError>, T)> + Send>>
where
    K: AsRef<[u8]> + Send + 'static,
    V: AsRef<[u8]> + Send + 'static,
    T: Default + Send + 'static,
{
    let max_inflight = max_inflight.max(1);

    Box::pin(stream! {
        let mut core = PipelineCore::new(delay_error);
        let semaphore = Arc::new(Semaphore::new(max_inflight));
        let mut upstream = Box::pin(upstream);
        let mut pending = FuturesUnordered::new();
        let mut upstream_done = false;
        let mut accepting = true;

        loop {
            if upstream_done && pending.is_empty() && core.is_terminal() {
                break;
            }

            tokio::select! {
                biased;

                maybe = pending.next(), if !pending.is_empty() => {
                    let Some((result, correlator)) = maybe else { continue };
                    let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                    log_if_terminal_failure(&core.complete_delivery(&outcome));
                    if accepting {
                        yield (result, correlator);
                    } else {
                        warn!("dropping delivery result after pipeline termination");
                    }
                    if core.is_terminal() {
                        accepting = false;
                    }
                }

                item = upstream.next(), if accepting && !upstream_done && semaphore.available_permits() > 0 => {
                    match item {
                        Some(record) => {
                            if !core.begin_dispatch() {
                                warn!(topic = %record.topic, "dropping record, pipeline already terminal");
                                continue;
                            }

                            let correlator = record.correlator.unwrap_or_default();
                            let key_bytes: Vec<u8> = record.key.as_ref().map(AsRef::as_ref).unwrap_or(&[]).to_vec();
                            let payload_bytes: Vec<u8> = record.value.as_ref().to_vec();
                            let topic = record.topic.clone();

                            #[allow(clippy::expect_used)] // guarded by the `available_permits() > 0` arm condition above
                            let permit = Arc::clone(&semaphore)
                                .try_acquire_owned()
                                .expect("guarded by available_permits() check above");
                            let (tx, rx) = oneshot::channel();
                            let base = build_base_record(&topic, &payload_bytes, &key_bytes, record.partition, &record.headers)
                                .delivery_opaque(Box::new(tx));

                            match producer.get().await {
                                Ok(handle) => {
                                    if let Err((err, _)) = handle.send(base) {
                                        let send_err = SendError::Delivery {
                                            topic: topic.clone(),
                                            reason: err.to_string(),
                                        };
                                        drop(permit);
                                        log_if_terminal_failure(&core.complete_delivery(&Err(send_err.clone())));
                                        if accepting {
                                            yield (Err(send_err), correlator);
                                        }
                                        if core.is_terminal() {
                                            accepting = false;
                                        }
                                        continue;
                                    }

                                    pending.push(async move {
                                        let _permit = permit;
                                        let result = rx.await.unwrap_or(Err(SendError::Closed));
                                        (result, correlator)
                                    });
                                }
                                Err(send_err) => {
                                    drop(permit);
                                    log_if_terminal_failure(&core.complete_delivery(&Err(send_err.clone())));
                                    if accepting {
                                        yield (Err(send_err), correlator);
                                    }
                                    if core.is_terminal() {
                                        accepting = false;
                                    }
                                }
                            }
                        }
                        None => {
                            upstream_done = true;
                            log_if_terminal_failure(&core.upstream_done());
                            if core.is_terminal() {
                                accepting = false;
                            }
                        }
                    }
                }
            }
        }
    })
}
