//! The `ConsumerContext` wiring partition-assignment callbacks and seek
//! flushing into the event loop.
//!
//! Grounded on the Quickwit Kafka source's rebalance-callback pattern: seek
//! offsets are set on the `TopicPartitionList` inside `pre_rebalance`, since
//! that's the same list the client uses to call `assign` right afterwards
//! — not a copy read again in `post_rebalance`. Both callbacks run
//! synchronously, inline, on whatever thread called `poll`, which for this
//! crate is always the dedicated event-loop thread.

use std::sync::{Arc, Mutex};

use rdkafka::ClientContext;
use rdkafka::consumer::{ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use reactive_kafka_core::error::ReceiverError;
use reactive_kafka_core::seek::{SeekPosition, SeekablePartition};
use reactive_kafka_core::topic_partition::TopicPartition;
use tracing::{debug, warn};

/// User-supplied assignment callbacks, stored as trait objects since they
/// are set once at receiver-build time and invoked from inside a rebalance
/// callback that has no type parameters to propagate them through.
#[derive(Clone, Default)]
pub(crate) struct AssignmentHooks {
    pub(crate) on_assigned: Option<Arc<dyn Fn(&[SeekablePartition]) -> Result<(), String> + Send + Sync>>,
    pub(crate) on_revoked: Option<Arc<dyn Fn(&[TopicPartition]) -> Result<(), String> + Send + Sync>>,
}

/// `ConsumerContext` implementation for the reactive receiver.
///
/// Owns no consumer reference (constructing one would require the consumer
/// to hold this context, a cycle `rdkafka` doesn't offer a way around).
/// Instead, revoked partitions are recorded into `pending_revoked` for the
/// event loop to commit and remove *after* `poll` returns, on the same
/// thread — not from inside the callback itself.
pub(crate) struct ReactiveConsumerContext {
    hooks: AssignmentHooks,
    pending_revoked: Arc<Mutex<Vec<TopicPartition>>>,
    pending_assigned: Arc<Mutex<Vec<TopicPartition>>>,
    fatal: Arc<Mutex<Option<ReceiverError>>>,
}

impl ReactiveConsumerContext {
    pub(crate) fn new(
        hooks: AssignmentHooks,
        pending_revoked: Arc<Mutex<Vec<TopicPartition>>>,
        pending_assigned: Arc<Mutex<Vec<TopicPartition>>>,
        fatal: Arc<Mutex<Option<ReceiverError>>>,
    ) -> Self {
        Self {
            hooks,
            pending_revoked,
            pending_assigned,
            fatal,
        }
    }

    fn fail(&self, reason: String) {
        let mut fatal = self.fatal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(ReceiverError::AssignmentCallback(reason));
        }
    }
}

impl ClientContext for ReactiveConsumerContext {}

impl ConsumerContext for ReactiveConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let partitions: Vec<TopicPartition> = tpl
                    .elements()
                    .iter()
                    .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
                    .collect();

                debug!(count = partitions.len(), "partitions revoked");

                if let Some(callback) = &self.hooks.on_revoked {
                    if let Err(reason) = callback(&partitions) {
                        warn!(reason = %reason, "on_partitions_revoked callback failed");
                        self.fail(reason);
                    }
                }

                if let Ok(mut revoked) = self.pending_revoked.lock() {
                    revoked.extend(partitions);
                }
            }
            Rebalance::Assign(tpl) => {
                // Seeks recorded here must land on this same `tpl` before
                // this callback returns: it's what the library's own
                // rebalance handling uses to call `assign` immediately
                // afterwards, not a copy. Applying a seek from
                // `post_rebalance` would be too late.
                let handles: Vec<SeekablePartition> = tpl
                    .elements()
                    .iter()
                    .map(|elem| {
                        let tp = TopicPartition::new(elem.topic(), elem.partition());
                        let position = elem.offset().to_raw().unwrap_or(-1);
                        SeekablePartition::new(tp, position)
                    })
                    .collect();

                debug!(count = handles.len(), "partitions assigned");

                if let Some(callback) = &self.hooks.on_assigned {
                    if let Err(reason) = callback(&handles) {
                        warn!(reason = %reason, "on_partitions_assigned callback failed");
                        self.fail(reason);
                    }
                }

                for handle in &handles {
                    if let Some(seek) = handle.take_pending_seek() {
                        apply_seek(tpl, handle.topic_partition(), seek);
                    }
                }

                if let Ok(mut assigned) = self.pending_assigned.lock() {
                    assigned.extend(handles.into_iter().map(|h| h.topic_partition().clone()));
                }
            }
            Rebalance::Error(reason) => {
                warn!(%reason, "rebalance error");
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        debug!(?rebalance, "post-rebalance");
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(?offsets, "commit callback: success"),
            Err(err) => warn!(error = %err, "commit callback: failure"),
        }
    }
}

fn apply_seek(tpl: &TopicPartitionList, tp: &TopicPartition, seek: SeekPosition) {
    let Some(mut elem) = tpl.find_partition(tp.topic(), tp.partition()) else {
        warn!(%tp, "seek recorded for a partition absent from the assignment");
        return;
    };
    let offset = match seek {
        SeekPosition::Beginning => Offset::Beginning,
        SeekPosition::End => Offset::End,
        SeekPosition::Offset(value) => Offset::Offset(value),
    };
    if let Err(err) = elem.set_offset(offset) {
        warn!(%tp, error = %err, "failed to apply seek before assign");
    }
}
