//! Bridges `rdkafka`'s delivery callback (fired on its internal producer
//! thread) back into a `oneshot` future any task can `.await`.

use rdkafka::ClientContext;
use rdkafka::message::Message;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use reactive_kafka_core::error::SendError;
use reactive_kafka_core::record::RecordMetadata;
use tokio::sync::oneshot;

/// One pending delivery: the sender half of the oneshot channel `send()`'s
/// caller is awaiting on.
pub type DeliveryOpaque = Box<oneshot::Sender<Result<RecordMetadata, SendError>>>;

/// `ProducerContext` implementation wiring librdkafka's delivery callback to
/// a `oneshot::Sender` stashed as the record's opaque.
///
/// Grounded on the `FSMaxB-rust-rdkafka` base producer's
/// `DeliveryOpaque`/`ProducerContext::delivery` pattern: the opaque travels
/// with the record through librdkafka's internal queue and comes back
/// attached to exactly one delivery event, guaranteeing exactly one
/// terminal signal per `send()`.
#[derive(Clone, Default)]
pub struct DeliveryContext;

impl DeliveryContext {
    /// Construct a context. Stateless; exists for trait-impl symmetry with
    /// contexts that do carry state (see `ReactiveConsumerContext`).
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = DeliveryOpaque;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, delivery_opaque: Self::DeliveryOpaque) {
        let result = match delivery_result {
            Ok(message) => Ok(RecordMetadata {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                timestamp: message.timestamp().to_millis(),
            }),
            Err((err, message)) => Err(SendError::Delivery {
                topic: message.topic().to_string(),
                reason: err.to_string(),
            }),
        };

        // The awaiting side may have dropped its receiver (e.g. the caller
        // was itself dropped before delivery completed); nothing to do.
        let _ = delivery_opaque.send(result);
    }
}
