//! # Reactive Kafka Core
//!
//! Core data model, configuration, and error types shared by the reactive
//! Kafka client's inbound and outbound engines.
//!
//! This crate has no `rdkafka` dependency: it defines the types that cross
//! the boundary between the `kafka` crate's event loop and application code
//! (records, offsets, config, errors) without depending on how the broker
//! connection itself is implemented.
//!
//! ## Modules
//!
//! - [`record`]: outbound `Record`/`RecordMetadata`, inbound `ConsumerRecord`.
//! - [`message`]: `ConsumerMessage`, the record + offset-handle pair handed
//!   to downstream subscribers.
//! - [`offset`]: `OffsetHandle` and the requests it sends back to the event
//!   loop that owns the consumer.
//! - [`seek`]: `SeekablePartition`, the assignment-callback-scoped seek API.
//! - [`config`]: `SenderConfig`, `ReceiverConfig`, `AckMode`.
//! - [`subscription`]: topic list / pattern / explicit assignment.
//! - [`error`]: `SendError`, `ReceiverError`, `OffsetError`.
//! - [`topic_partition`]: the `TopicPartition` newtype.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod offset;
pub mod record;
pub mod seek;
pub mod subscription;
pub mod topic_partition;
