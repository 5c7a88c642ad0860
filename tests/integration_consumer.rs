//! Integration tests for the consumer read loop.
//!
//! Requires a running Redis instance (see `common` for the connection
//! strategy); each test returns early when none is reachable.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis_streams_trigger::{
    ConsumerConfig, EntryId, Error, OnHandlerError, RunMode, StreamConsumer, StreamEntry,
    StreamIdentity,
};

fn consumer(stream: &str, group: &str, name: &str, mode: RunMode) -> StreamConsumer {
    let identity = StreamIdentity::new(stream, group, name).unwrap();
    StreamConsumer::new(mode, common::connection_config(), identity).unwrap()
}

fn short_block() -> ConsumerConfig {
    ConsumerConfig::new().with_block(Duration::from_millis(500))
}

#[tokio::test]
async fn round_trip_append_then_read() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:rt:");

    let mut producer = consumer(&stream, "rt-group", "producer", RunMode::SinglePass);
    let appended = producer
        .append(&[("key".to_string(), "v1".to_string())])
        .await
        .unwrap();

    let seen: Arc<Mutex<Vec<StreamEntry>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut reader = consumer(&stream, "rt-group", "c1", RunMode::SinglePass)
        .with_config(short_block());
    reader
        .run(move |batch| {
            sink.lock().unwrap().extend(batch);
            Ok(())
        })
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, appended);
    assert_eq!(seen[0].fields.get("key").map(String::as_str), Some("v1"));
    assert_eq!(reader.stats().entries_processed, 1);

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn single_pass_performs_one_read_and_closes() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    // No entries at all: one idle timeout, then the connection is closed.
    let stream = common::unique_key("trigger:sp:");
    let mut c = consumer(&stream, "sp-group", "c1", RunMode::SinglePass)
        .with_config(short_block());

    let invocations = Arc::new(Mutex::new(0u32));
    let counter = invocations.clone();
    c.run(move |_batch| {
        *counter.lock().unwrap() += 1;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(*invocations.lock().unwrap(), 0);

    // The session is terminal after the pass.
    assert!(matches!(
        c.append(&[("key".to_string(), "v1".to_string())]).await,
        Err(Error::ConnectionClosed)
    ));

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn continuous_loop_stops_well_within_the_block_window() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:stop:");
    let c = consumer(&stream, "stop-group", "c1", RunMode::Continuous)
        .with_config(ConsumerConfig::new().with_block(Duration::from_secs(30)));

    let handle = c.spawn(|_batch| Ok(()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished());

    // The token is observed at the in-flight blocking read; with a 30s block
    // this only passes because shutdown does not wait out the window.
    let stopped = tokio::time::timeout(Duration::from_secs(2), handle.stop()).await;
    assert!(stopped.expect("loop did not stop in time").is_ok());

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn batches_preserve_entry_id_order_across_reads() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:order:");
    for i in 0..6 {
        common::xadd(&stream, "seq", &i.to_string());
    }

    let c = consumer(&stream, "order-group", "c1", RunMode::Continuous).with_config(
        ConsumerConfig::new()
            .with_block(Duration::from_millis(200))
            .with_batch_size(2),
    );
    let token = c.shutdown_token();

    let seen: Arc<Mutex<Vec<EntryId>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = c.spawn(move |batch| {
        let mut ids = sink.lock().unwrap();
        ids.extend(batch.ids());
        if ids.len() >= 6 {
            token.cancel();
        }
        Ok(())
    });

    tokio::time::timeout(Duration::from_secs(10), handle.join())
        .await
        .expect("loop did not finish")
        .unwrap();

    let ids = seen.lock().unwrap();
    assert_eq!(ids.len(), 6);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn entries_are_delivered_to_at_most_one_consumer_per_group() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:excl:");
    for i in 0..10 {
        common::xadd(&stream, "seq", &i.to_string());
    }

    let read_half = |name: &'static str| {
        let stream = stream.clone();
        async move {
            let seen: Arc<Mutex<Vec<EntryId>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            let mut c = consumer(&stream, "excl-group", name, RunMode::SinglePass)
                .with_config(short_block().with_batch_size(5));
            c.run(move |batch| {
                sink.lock().unwrap().extend(batch.ids());
                Ok(())
            })
            .await
            .unwrap();
            Arc::try_unwrap(seen).unwrap().into_inner().unwrap()
        }
    };

    let first = read_half("c1").await;
    let second = read_half("c2").await;

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    // Exclusive delivery per group: no id appears in both halves, and the
    // group cursor only advances.
    assert!(first.iter().all(|id| !second.contains(id)));
    assert!(first.last().unwrap() < second.first().unwrap());

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn handler_failure_aborts_by_default() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:abort:");
    common::xadd(&stream, "key", "v1");

    let mut c = consumer(&stream, "abort-group", "c1", RunMode::SinglePass)
        .with_config(short_block());
    let err = c.run(|_batch| Err("boom".into())).await.unwrap_err();
    assert!(matches!(err, Error::Handler(_)));

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn handler_failure_can_be_skipped() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:skip:");
    common::xadd(&stream, "key", "v1");

    let mut c = consumer(&stream, "skip-group", "c1", RunMode::SinglePass)
        .with_config(short_block().with_on_handler_error(OnHandlerError::Skip));
    c.run(|_batch| Err("boom".into())).await.unwrap();

    common::cleanup_key(&stream);
}

#[tokio::test]
async fn auto_ack_clears_the_pending_list() {
    if !common::redis_available() {
        eprintln!("skipping: no Redis server available");
        return;
    }

    let stream = common::unique_key("trigger:ack:");
    common::xadd(&stream, "key", "v1");
    common::xadd(&stream, "key", "v2");

    let mut c = consumer(&stream, "ack-group", "c1", RunMode::SinglePass)
        .with_config(short_block().with_auto_ack(true));
    c.run(|_batch| Ok(())).await.unwrap();

    // XPENDING summary reply starts with the pending count.
    let pending = common::redis_cli_output(&["XPENDING", &stream, "ack-group"])
        .unwrap_or_default();
    let count = pending.lines().next().unwrap_or("").trim().to_string();
    assert_eq!(count, "0");

    common::cleanup_key(&stream);
}
