//! The inbound engine's event loop: the sole owner of the `BaseConsumer`.
//!
//! Runs on a dedicated OS thread because `BaseConsumer::poll` blocks the
//! calling thread; running it directly on a tokio worker would starve that
//! worker's other tasks. Bridges into async-land purely through channels —
//! a bounded `tokio::sync::mpsc` downstream of delivered messages (its free
//! capacity is this crate's stand-in for reactive-stream demand) and an
//! unbounded one upstream of acknowledge/commit requests.
//!
//! The loop never blocks on downstream readiness: a full channel pauses the
//! assignment and holds the delivered message in `pending` rather than
//! calling `blocking_send`, so `poll` keeps being called every iteration and
//! the consumer group's heartbeat never stops.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use rdkafka::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::{CommitMode, Offset};
use reactive_kafka_core::config::{AckMode, ReceiverConfig};
use reactive_kafka_core::error::{OffsetError, ReceiverError};
use reactive_kafka_core::message::ConsumerMessage;
use reactive_kafka_core::offset::{OffsetHandle, OffsetRequest};
use reactive_kafka_core::record::{ConsumerRecord, Header};
use reactive_kafka_core::subscription::Subscription;
use reactive_kafka_core::topic_partition::TopicPartition;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::context::{AssignmentHooks, ReactiveConsumerContext};
use crate::offset_manager::OffsetManager;

type Downstream = mpsc::Sender<Result<ConsumerMessage<Vec<u8>, Vec<u8>>, ReceiverError>>;

/// Handle to a running event loop: the request sender given out to every
/// delivered message's `OffsetHandle`, plus the join handle for shutdown.
pub(crate) struct EventLoopHandle {
    pub(crate) requests: mpsc::UnboundedSender<OffsetRequest>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl EventLoopHandle {
    /// Block until the event-loop thread exits (it exits once the
    /// downstream channel is dropped). Used by `close()`.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the event loop. Returns immediately; the consumer itself is built
/// on the new thread so construction failures surface as the first item on
/// `downstream` rather than blocking the caller.
pub(crate) fn spawn(config: ReceiverConfig, ack_mode: AckMode, hooks: AssignmentHooks, downstream: Downstream) -> EventLoopHandle {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let thread_requests_tx = requests_tx.clone();

    #[allow(clippy::expect_used)] // a process that cannot spawn threads cannot run this crate at all
    let join = std::thread::Builder::new()
        .name("reactive-kafka-consumer".to_string())
        .spawn(move || run(config, ack_mode, hooks, downstream, thread_requests_tx, requests_rx))
        .expect("failed to spawn consumer event-loop thread");

    EventLoopHandle {
        requests: requests_tx,
        join: Some(join),
    }
}

struct AutoCommitRetry {
    pending: Option<Vec<(TopicPartition, i64)>>,
    attempt: usize,
    next_attempt_at: Instant,
    max_attempts: usize,
}

impl AutoCommitRetry {
    const fn new(max_attempts: usize) -> Self {
        Self {
            pending: None,
            attempt: 0,
            next_attempt_at: Instant::now(),
            max_attempts,
        }
    }

    fn due(&self, now: Instant) -> bool {
        self.pending.is_some() && now >= self.next_attempt_at
    }

    fn schedule_retry(&mut self, batch: Vec<(TopicPartition, i64)>) {
        self.attempt += 1;
        self.pending = Some(batch);
        let backoff = Duration::from_millis(200 * 2u64.saturating_pow(self.attempt.min(16) as u32)).min(Duration::from_secs(10));
        self.next_attempt_at = Instant::now() + backoff;
    }

    fn clear(&mut self) {
        self.pending = None;
        self.attempt = 0;
    }
}

fn is_retryable(err: &KafkaError) -> bool {
    !matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::UnknownMemberId | RDKafkaErrorCode::IllegalGeneration)
    )
}

fn single_partition_list(tp: &TopicPartition, offset: i64) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    let _ = tpl.add_partition_offset(tp.topic(), tp.partition(), Offset::Offset(offset));
    tpl
}

fn batch_partition_list(batch: &[(TopicPartition, i64)]) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    for (tp, offset) in batch {
        let _ = tpl.add_partition_offset(tp.topic(), tp.partition(), Offset::Offset(*offset));
    }
    tpl
}

fn to_consumer_record(message: &rdkafka::message::BorrowedMessage<'_>) -> ConsumerRecord<Vec<u8>, Vec<u8>> {
    let headers = message
        .headers()
        .map(|headers| {
            (0..headers.count())
                .map(|i| {
                    let h = headers.get(i);
                    Header {
                        key: h.key.to_string(),
                        value: h.value.map(<[u8]>::to_vec).unwrap_or_default(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    ConsumerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(|ms| SystemTime::UNIX_EPOCH + Duration::from_millis(ms)),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

#[allow(clippy::too_many_lines)]
fn run(
    config: ReceiverConfig,
    ack_mode: AckMode,
    hooks: AssignmentHooks,
    downstream: Downstream,
    requests_tx: mpsc::UnboundedSender<OffsetRequest>,
    mut requests_rx: mpsc::UnboundedReceiver<OffsetRequest>,
) {
    let pending_revoked = Arc::new(Mutex::new(Vec::new()));
    let pending_assigned = Arc::new(Mutex::new(Vec::new()));
    let fatal = Arc::new(Mutex::new(None));
    let context = ReactiveConsumerContext::new(hooks.clone(), Arc::clone(&pending_revoked), Arc::clone(&pending_assigned), Arc::clone(&fatal));

    let mut client_config = ClientConfig::new();
    for (key, value) in &config.properties {
        client_config.set(key, value);
    }

    let consumer: BaseConsumer<ReactiveConsumerContext> = match client_config.create_with_context(context) {
        Ok(consumer) => consumer,
        Err(err) => {
            let _ = downstream.blocking_send(Err(ReceiverError::Poll(err.to_string())));
            return;
        }
    };

    if let Err(err) = subscribe(&consumer, &config.subscription, &hooks) {
        let _ = downstream.blocking_send(Err(err));
        return;
    }

    info!(?config.subscription, ?ack_mode, "consumer event loop started");

    let mut offsets = OffsetManager::new(config.commit_batch_size, config.commit_interval, Instant::now());

    // Explicit assignment never triggers `post_rebalance`, so the partitions
    // it names would otherwise go untracked by offset bookkeeping.
    if let Subscription::Assignment(partitions) = &config.subscription {
        for tp in partitions {
            offsets.register_partition(tp.clone(), 0);
        }
    }
    let mut retry = AutoCommitRetry::new(config.max_auto_commit_attempts);
    let mut paused = false;
    let mut pending: VecDeque<Result<ConsumerMessage<Vec<u8>, Vec<u8>>, ReceiverError>> = VecDeque::new();

    'outer: loop {
        if downstream.is_closed() {
            debug!("downstream dropped, closing event loop");
            break;
        }

        while let Ok(request) = requests_rx.try_recv() {
            match request {
                OffsetRequest::Acknowledge { topic_partition, offset } => {
                    offsets.acknowledge(&topic_partition, offset);
                }
                OffsetRequest::Commit { topic_partition, offset, reply } => {
                    let tpl = single_partition_list(&topic_partition, offset);
                    let result = consumer.commit(&tpl, CommitMode::Sync).map_err(|err| OffsetError::Commit {
                        topic_partition: topic_partition.to_string(),
                        offset,
                        reason: err.to_string(),
                        retryable: is_retryable(&err),
                    });
                    if result.is_ok() {
                        offsets.record_committed(&topic_partition, offset, Instant::now());
                    }
                    let _ = reply.send(result);
                }
            }
        }

        if let Some(err) = fatal.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            let _ = downstream.blocking_send(Err(err));
            break;
        }

        {
            let mut revoked = pending_revoked.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !revoked.is_empty() {
                let batch: Vec<(TopicPartition, i64)> = revoked
                    .drain(..)
                    .filter_map(|tp| offsets.remove_partition(&tp).map(|(acknowledged, _)| (tp, acknowledged)))
                    .filter(|(_, offset)| *offset > 0)
                    .collect();
                if !batch.is_empty() && !matches!(ack_mode, AckMode::ManualCommit) {
                    let tpl = batch_partition_list(&batch);
                    if let Err(err) = consumer.commit(&tpl, CommitMode::Sync) {
                        warn!(error = %err, "best-effort commit of revoked partitions failed");
                    }
                }
            }
        }

        {
            let mut assigned = pending_assigned.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for tp in assigned.drain(..) {
                offsets.register_partition(tp, 0);
            }
        }

        // Drain whatever backpressure held back last iteration before
        // fetching more; a full downstream channel never blocks this
        // thread, since blocking here would stop heartbeating the group.
        while let Some(item) = pending.pop_front() {
            match downstream.try_send(item) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(item)) => {
                    pending.push_front(item);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break 'outer,
            }
        }

        if pending.is_empty() && paused {
            if let Ok(assignment) = consumer.assignment() {
                if consumer.resume(&assignment).is_ok() {
                    paused = false;
                }
            }
        }

        match consumer.poll(config.poll_timeout) {
            Some(Ok(message)) => {
                let tp = TopicPartition::new(message.topic(), message.partition());
                let offset = message.offset();

                if matches!(ack_mode, AckMode::AtmostOnce) {
                    let tpl = single_partition_list(&tp, offset + 1);
                    if let Err(err) = consumer.commit(&tpl, CommitMode::Sync) {
                        warn!(%tp, offset, error = %err, "at-most-once pre-delivery commit failed");
                    } else {
                        offsets.record_committed(&tp, offset + 1, Instant::now());
                        offsets.acknowledge(&tp, offset + 1);
                    }
                }

                let record = to_consumer_record(&message);
                let handle = OffsetHandle::new(tp.clone(), offset, requests_tx.clone());

                if matches!(ack_mode, AckMode::AutoAck) {
                    offsets.acknowledge(&tp, offset + 1);
                }

                let item = ConsumerMessage::new(record, handle);
                match downstream.try_send(Ok(item)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(item)) => {
                        if !paused {
                            if let Ok(assignment) = consumer.assignment() {
                                if consumer.pause(&assignment).is_err() {
                                    warn!("failed to pause assignment under backpressure");
                                }
                                paused = true;
                            }
                        }
                        pending.push_back(item);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break 'outer,
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "poll failed");
                pending.push_back(Err(ReceiverError::Poll(err.to_string())));
            }
            None => {}
        }

        if matches!(ack_mode, AckMode::AutoAck | AckMode::ManualAck) {
            let now = Instant::now();

            if retry.due(now) {
                if let Some(batch) = retry.pending.clone() {
                    attempt_commit(&consumer, &mut offsets, &batch, &mut retry, &downstream, now);
                }
            } else if retry.pending.is_none() && offsets.commit_due(now) {
                let batch = offsets.snapshot_for_commit();
                if !batch.is_empty() {
                    attempt_commit(&consumer, &mut offsets, &batch, &mut retry, &downstream, now);
                }
            }

            if retry.attempt > retry.max_attempts {
                error!(attempts = retry.attempt, "auto-commit retries exhausted");
                let _ = downstream.blocking_send(Err(ReceiverError::Commit(OffsetError::RetriesExhausted {
                    attempts: retry.attempt,
                    last_error: "commit retries exhausted".to_string(),
                })));
                break 'outer;
            }
        }
    }

    if !matches!(ack_mode, AckMode::ManualCommit) {
        let batch = offsets.snapshot_for_commit();
        if !batch.is_empty() {
            let tpl = batch_partition_list(&batch);
            if let Err(err) = consumer.commit(&tpl, CommitMode::Sync) {
                warn!(error = %err, "final commit on close failed");
            }
        }
    }

    info!("consumer event loop stopped");
}

fn attempt_commit(
    consumer: &BaseConsumer<ReactiveConsumerContext>,
    offsets: &mut OffsetManager,
    batch: &[(TopicPartition, i64)],
    retry: &mut AutoCommitRetry,
    downstream: &Downstream,
    now: Instant,
) {
    let tpl = batch_partition_list(batch);
    match consumer.commit(&tpl, CommitMode::Sync) {
        Ok(()) => {
            for (tp, offset) in batch {
                offsets.record_committed(tp, *offset, now);
            }
            retry.clear();
        }
        Err(err) if is_retryable(&err) => {
            warn!(error = %err, attempt = retry.attempt + 1, "auto-commit failed, retrying");
            retry.schedule_retry(batch.to_vec());
        }
        Err(err) => {
            error!(error = %err, "auto-commit failed with a non-retryable error");
            let _ = downstream.blocking_send(Err(ReceiverError::Commit(OffsetError::Commit {
                topic_partition: batch.first().map(|(tp, _)| tp.to_string()).unwrap_or_default(),
                offset: batch.first().map(|(_, o)| *o).unwrap_or_default(),
                reason: err.to_string(),
                retryable: false,
            })));
        }
    }
}

fn subscribe(
    consumer: &BaseConsumer<ReactiveConsumerContext>,
    subscription: &Subscription,
    hooks: &AssignmentHooks,
) -> Result<(), ReceiverError> {
    match subscription {
        Subscription::Topics(topics) => {
            let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer.subscribe(&refs).map_err(|err| ReceiverError::Poll(err.to_string()))
        }
        Subscription::Pattern(pattern) => {
            let expr = if pattern.starts_with('^') { pattern.clone() } else { format!("^{pattern}") };
            consumer.subscribe(&[expr.as_str()]).map_err(|err| ReceiverError::Poll(err.to_string()))
        }
        Subscription::Assignment(partitions) => {
            let mut tpl = TopicPartitionList::new();
            for tp in partitions {
                let _ = tpl.add_partition(tp.topic(), tp.partition());
            }
            consumer.assign(&tpl).map_err(|err| ReceiverError::Poll(err.to_string()))?;

            // Explicit assignment bypasses group rebalancing entirely, so no
            // `post_rebalance` callback will ever fire for it; invoke the
            // assignment hook here, once, to mirror what group-managed
            // subscriptions get from the consumer context.
            if let Some(callback) = &hooks.on_assigned {
                let handles: Vec<_> = partitions.iter().map(|tp| reactive_kafka_core::seek::SeekablePartition::new(tp.clone(), -1)).collect();
                if let Err(reason) = callback(&handles) {
                    return Err(ReceiverError::AssignmentCallback(reason));
                }
                for handle in &handles {
                    if let Some(seek) = handle.take_pending_seek() {
                        let offset = match seek {
                            reactive_kafka_core::seek::SeekPosition::Beginning => Offset::Beginning,
                            reactive_kafka_core::seek::SeekPosition::End => Offset::End,
                            reactive_kafka_core::seek::SeekPosition::Offset(value) => Offset::Offset(value),
                        };
                        let _ = tpl.set_partition_offset(handle.topic_partition().topic(), handle.topic_partition().partition(), offset);
                    }
                }
                consumer.assign(&tpl).map_err(|err| ReceiverError::Poll(err.to_string()))?;
            }

            Ok(())
        }
    }
}
