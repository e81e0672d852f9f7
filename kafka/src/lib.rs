//! # Reactive Kafka
//!
//! A reactive bridge between `rdkafka`'s poll/callback consumer and producer
//! APIs and Rust's `Stream` abstraction.
//!
//! - [`KafkaSender`] drives a stream of outbound [`Record`](reactive_kafka_core::record::Record)s
//!   through a shared, lazily-constructed producer, emitting broker
//!   acknowledgements while bounding in-flight concurrency and preserving
//!   per-partition order.
//! - [`KafkaReceiver`] turns a Kafka consumer into a lazy stream of
//!   [`ConsumerMessage`](reactive_kafka_core::message::ConsumerMessage)s with
//!   one of four acknowledgement modes, seek control at assignment time, and
//!   pause/resume backpressure that keeps the consumer group's heartbeat
//!   alive under slow downstream processing.
//!
//! The consumer is owned exclusively by a dedicated OS thread (its `poll` is
//! blocking and would otherwise starve a `tokio` worker); the producer is
//! thread-safe and shared behind an `Arc`. Both bridge into async-land
//! through `tokio::sync` channels — a bounded `mpsc` channel's free capacity
//! is this crate's stand-in for reactive-stream demand.
//!
//! Configuration, error, and data types (`SenderConfig`, `ReceiverConfig`,
//! `Record`, `ConsumerRecord`, `SendError`, `ReceiverError`, ...) live in
//! [`reactive_kafka_core`] and are re-exported here for convenience.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod delivery;
mod event_loop;
mod offset_manager;
mod producer_handle;
mod receiver;
mod send_pipeline;
mod sender;

pub use reactive_kafka_core::config::{AckMode, ReceiverConfig, SenderConfig};
pub use reactive_kafka_core::error::{OffsetError, ReceiverError, SendError};
pub use reactive_kafka_core::message::ConsumerMessage;
pub use reactive_kafka_core::offset::OffsetHandle;
pub use reactive_kafka_core::record::{ConsumerRecord, Header, PartitionInfo, Record, RecordMetadata};
pub use reactive_kafka_core::seek::{SeekPosition, SeekablePartition};
pub use reactive_kafka_core::subscription::Subscription;
pub use reactive_kafka_core::topic_partition::TopicPartition;

pub use receiver::{KafkaReceiver, ReceiverBuilder, ReceiverMessages};
pub use sender::KafkaSender;
