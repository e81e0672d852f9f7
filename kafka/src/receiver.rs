//! The inbound engine's public API.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use reactive_kafka_core::config::{AckMode, ReceiverConfig};
use reactive_kafka_core::error::ReceiverError;
use reactive_kafka_core::message::ConsumerMessage;
use reactive_kafka_core::seek::SeekablePartition;
use reactive_kafka_core::subscription::Subscription;
use reactive_kafka_core::topic_partition::TopicPartition;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::context::AssignmentHooks;
use crate::event_loop::{self, EventLoopHandle};

/// Entry point for building an inbound subscription.
pub struct KafkaReceiver;

impl KafkaReceiver {
    /// Subscribe to a topic list or pattern, going through normal
    /// consumer-group rebalancing.
    #[must_use]
    pub fn listen_on(mut config: ReceiverConfig, subscription: Subscription) -> ReceiverBuilder {
        config.subscription = subscription;
        ReceiverBuilder::new(config)
    }

    /// Assign directly to a fixed set of partitions, bypassing group
    /// coordination entirely.
    #[must_use]
    pub fn assign(mut config: ReceiverConfig, partitions: Vec<TopicPartition>) -> ReceiverBuilder {
        config.subscription = Subscription::Assignment(partitions);
        ReceiverBuilder::new(config)
    }
}

/// Accumulates assignment callbacks before a terminal ack-mode method spawns
/// the consumer event loop.
pub struct ReceiverBuilder {
    config: ReceiverConfig,
    hooks: AssignmentHooks,
}

impl ReceiverBuilder {
    fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            hooks: AssignmentHooks::default(),
        }
    }

    /// Register a callback invoked synchronously, on the event-loop thread,
    /// whenever partitions are assigned. Seek operations recorded on the
    /// handles are applied before the next poll.
    #[must_use]
    pub fn on_partitions_assigned<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[SeekablePartition]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hooks.on_assigned = Some(Arc::new(callback));
        self
    }

    /// Register a callback invoked synchronously, on the event-loop thread,
    /// whenever partitions are revoked (before their acknowledged offsets
    /// are committed).
    #[must_use]
    pub fn on_partitions_revoked<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[TopicPartition]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hooks.on_revoked = Some(Arc::new(callback));
        self
    }

    /// Every record is auto-acknowledged on delivery; commits are batched by
    /// count/interval, and acknowledged offsets are committed on close.
    #[must_use]
    pub fn auto_ack(self) -> ReceiverMessages {
        self.build(AckMode::AutoAck)
    }

    /// The offset is committed *before* the record is delivered downstream —
    /// zero redelivery on crash, at the cost of possible message loss.
    #[must_use]
    pub fn atmost_once(self) -> ReceiverMessages {
        self.build(AckMode::AtmostOnce)
    }

    /// The application calls `ConsumerMessage::offset().acknowledge()`;
    /// commits are batched by count/interval, and acknowledged offsets are
    /// committed on close.
    #[must_use]
    pub fn manual_ack(self) -> ReceiverMessages {
        self.build(AckMode::ManualAck)
    }

    /// The application calls `ConsumerMessage::offset().commit()` explicitly.
    /// No automatic commits are issued in this mode, including on close —
    /// the application owns every commit.
    #[must_use]
    pub fn manual_commit(self) -> ReceiverMessages {
        self.build(AckMode::ManualCommit)
    }

    fn build(self, ack_mode: AckMode) -> ReceiverMessages {
        let (tx, rx) = mpsc::channel(self.config.inbound_buffer);
        let handle = event_loop::spawn(self.config, ack_mode, self.hooks, tx);
        ReceiverMessages {
            inner: ReceiverStream::new(rx),
            _handle: handle,
        }
    }
}

/// The stream of inbound deliveries produced by a terminal `ReceiverBuilder`
/// method.
///
/// Dropping this stream drops the channel the event loop sends into; the
/// loop notices on its next iteration, commits (per ack mode) and stops —
/// there is no separate blocking `close()` to call.
pub struct ReceiverMessages {
    inner: ReceiverStream<Result<ConsumerMessage<Vec<u8>, Vec<u8>>, ReceiverError>>,
    _handle: EventLoopHandle,
}

impl Stream for ReceiverMessages {
    type Item = Result<ConsumerMessage<Vec<u8>, Vec<u8>>, ReceiverError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
