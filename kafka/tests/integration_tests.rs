//! Integration tests against a real broker via testcontainers.
//!
//! These validate behavior that unit tests over `PipelineCore`/`OffsetManager`
//! can't reach: a live `rdkafka` consumer/producer pair, real rebalancing,
//! and real commit round-trips. Run with `cargo test -- --ignored` against a
//! Docker daemon.
//!
//! # Panics
//!
//! These tests use `expect()` and `panic!()` for setup failures, which is
//! acceptable in test code.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use reactive_kafka::{KafkaReceiver, KafkaSender, Record, ReceiverConfig, SenderConfig, Subscription};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{Kafka, KAFKA_PORT};

async fn start_broker() -> (ContainerAsync<Kafka>, String) {
    // Run with `RUST_LOG=reactive_kafka=debug` to see the event loop's
    // pause/resume, commit, and rebalance logging while these run.
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();

    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("failed to start Kafka container");

    let host = kafka.get_host().await.expect("failed to get host");
    let port = kafka.get_host_port_ipv4(KAFKA_PORT).await.expect("failed to get port");
    let brokers = format!("{host}:{port}");
    (kafka, brokers)
}

fn sender_for(brokers: &str) -> KafkaSender {
    KafkaSender::new(SenderConfig::new().property("bootstrap.servers", brokers))
}

fn receiver_config(brokers: &str, group: &str, topic: &str) -> ReceiverConfig {
    ReceiverConfig::new(Subscription::Topics(vec![topic.to_string()]))
        .property("bootstrap.servers", brokers)
        .property("group.id", group)
        .property("auto.offset.reset", "earliest")
        .poll_timeout(Duration::from_millis(100))
}

#[tokio::test]
#[ignore]
async fn send_receive_round_trip() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);
    let mut stream = KafkaReceiver::listen_on(receiver_config(&brokers, "rt-group", "rt-topic"), Subscription::Topics(vec!["rt-topic".to_string()])).auto_ack();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    sender
        .send(Record::<&[u8], &[u8], ()>::new("rt-topic", b"hello".as_slice()).with_key(b"k1".as_slice()))
        .await
        .expect("send should succeed");

    let delivered = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended unexpectedly")
        .expect("delivery should not carry a receiver error");

    assert_eq!(delivered.record().value, b"hello".to_vec());
    assert_eq!(delivered.record().key, Some(b"k1".to_vec()));
}

#[tokio::test]
#[ignore]
async fn seek_to_beginning_replays_prior_sends() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    for i in 0..3 {
        sender
            .send(Record::<&[u8], &[u8], ()>::new("seek-topic", vec![i as u8]))
            .await
            .expect("send should succeed");
    }

    // A fresh consumer group with no prior commits would already start from
    // the beginning under auto.offset.reset=earliest; to actually exercise
    // the seek hook we force the group to latest and then seek back.
    let config = receiver_config(&brokers, "seek-group", "seek-topic").property("auto.offset.reset", "latest");

    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["seek-topic".to_string()]))
        .on_partitions_assigned(|partitions| {
            for partition in partitions {
                partition.seek_to_beginning();
            }
            Ok(())
        })
        .auto_ack();

    let mut received = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(10), async {
        while received.len() < 3 {
            if let Some(item) = stream.next().await {
                received.push(item.expect("delivery should not carry a receiver error"));
            }
        }
    })
    .await;

    collected.expect("timed out waiting for replayed messages");
    assert_eq!(received.len(), 3);
}

#[tokio::test]
#[ignore]
async fn atmost_once_commits_before_delivery() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    sender
        .send(Record::<&[u8], &[u8], ()>::new("amo-topic", b"payload".as_slice()))
        .await
        .expect("send should succeed");

    let config = receiver_config(&brokers, "amo-group", "amo-topic");
    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["amo-topic".to_string()])).atmost_once();

    let delivered = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended unexpectedly")
        .expect("delivery should not carry a receiver error");

    assert_eq!(delivered.record().value, b"payload".to_vec());

    // Dropping the stream tears the consumer down without re-committing;
    // a second consumer in the same group should not see this record again
    // since AtmostOnce commits the offset before the record was handed out.
    drop(stream);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let config = receiver_config(&brokers, "amo-group", "amo-topic");
    let mut replay = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["amo-topic".to_string()])).auto_ack();

    let nothing = tokio::time::timeout(Duration::from_secs(3), replay.next()).await;
    assert!(nothing.is_err(), "at-most-once should not redeliver an already-committed offset");
}

#[tokio::test]
#[ignore]
async fn manual_ack_batches_by_size_and_interval() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    for i in 0..10u8 {
        sender
            .send(Record::<&[u8], &[u8], ()>::new("batch-topic", vec![i]))
            .await
            .expect("send should succeed");
    }

    let config = receiver_config(&brokers, "batch-group", "batch-topic").commit_batch_size(10).commit_interval(Duration::from_secs(60));
    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["batch-topic".to_string()])).manual_ack();

    let mut seen = 0;
    let collected = tokio::time::timeout(Duration::from_secs(10), async {
        while seen < 10 {
            if let Some(item) = stream.next().await {
                let message = item.expect("delivery should not carry a receiver error");
                message.offset().acknowledge();
                seen += 1;
            }
        }
    })
    .await;

    collected.expect("timed out waiting for the full batch");
    assert_eq!(seen, 10);
}

#[tokio::test]
#[ignore]
async fn back_pressure_pauses_and_resumes_under_slow_downstream() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    for i in 0..20u8 {
        sender
            .send(Record::<&[u8], &[u8], ()>::new("bp-topic", vec![i]))
            .await
            .expect("send should succeed");
    }

    let config = receiver_config(&brokers, "bp-group", "bp-topic").property("max.poll.records", "1").inbound_buffer(2);
    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["bp-topic".to_string()])).auto_ack();

    let mut received = 0;
    let collected = tokio::time::timeout(Duration::from_secs(20), async {
        while received < 20 {
            if let Some(item) = stream.next().await {
                item.expect("delivery should not carry a receiver error");
                received += 1;
                // Slow consumer: force the bounded channel to fill and the
                // event loop to pause/resume the partition under it.
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    })
    .await;

    collected.expect("timed out waiting under slow downstream");
    assert_eq!(received, 20);
}

#[tokio::test]
#[ignore]
async fn ordering_is_preserved_per_partition_under_concurrent_sends() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    let upstream = futures::stream::iter((0..50u8).map(|i| Record::<&[u8], &[u8], ()>::new("order-topic", vec![i]).with_partition(0)));
    sender.send_all(upstream).await.expect("send_all should succeed");

    let config = receiver_config(&brokers, "order-group", "order-topic");
    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["order-topic".to_string()])).auto_ack();

    let mut received = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(15), async {
        while received.len() < 50 {
            if let Some(item) = stream.next().await {
                let message = item.expect("delivery should not carry a receiver error");
                received.push(message.record().value.clone());
            }
        }
    })
    .await;

    collected.expect("timed out waiting for ordered messages");
    let expected: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i]).collect();
    assert_eq!(received, expected, "records sent to the same partition must be delivered in order");
}

#[tokio::test]
#[ignore]
async fn delay_error_send_continues_past_a_failed_record() {
    let (_kafka, brokers) = start_broker().await;
    // A tiny `message.max.bytes` makes the oversized record fail producer-side
    // validation synchronously, without needing the broker to misbehave.
    let sender = KafkaSender::new(SenderConfig::new().property("bootstrap.servers", brokers.as_str()).property("message.max.bytes", "1000"));

    let oversized = vec![0u8; 5000];
    let upstream = futures::stream::iter(vec![
        Record::<&[u8], Vec<u8>, u32>::new("delay-topic", b"one".to_vec()).with_correlator(1),
        Record::<&[u8], Vec<u8>, u32>::new("delay-topic", oversized).with_correlator(2),
        Record::<&[u8], Vec<u8>, u32>::new("delay-topic", b"three".to_vec()).with_correlator(3),
    ]);

    let mut responses = sender.send_stream_with(upstream, 8, true);
    let mut outcomes = HashMap::new();
    while let Some((result, correlator)) = responses.next().await {
        outcomes.insert(correlator, result.is_ok());
    }

    assert_eq!(outcomes.len(), 3, "delay_error must still yield a response for every upstream record");
    assert!(outcomes[&1], "a record before the failure should still succeed");
    assert!(!outcomes[&2], "the oversized record should fail");
    assert!(outcomes[&3], "delay_error must let sends after the failure continue instead of short-circuiting");
}

#[tokio::test]
#[ignore]
async fn auto_commit_retries_until_it_succeeds() {
    let (_kafka, brokers) = start_broker().await;
    let sender = sender_for(&brokers);

    sender
        .send(Record::<&[u8], &[u8], ()>::new("retry-topic", b"payload".as_slice()))
        .await
        .expect("send should succeed");

    let config = receiver_config(&brokers, "retry-group", "retry-topic").commit_batch_size(1).commit_interval(Duration::from_millis(200)).max_auto_commit_attempts(5);
    let mut stream = KafkaReceiver::listen_on(config, Subscription::Topics(vec!["retry-topic".to_string()])).auto_ack();

    let delivered = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended unexpectedly")
        .expect("delivery should not carry a receiver error");

    assert_eq!(delivered.record().value, b"payload".to_vec());

    // Give the batch/interval commit trigger a few cycles to fire and
    // confirm against the broker before the test drops the stream.
    tokio::time::sleep(Duration::from_secs(1)).await;
}
