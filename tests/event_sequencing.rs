//! Run event ordering, replay and live delivery

use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use agora::events::{open_stream, EventBroker, MemoryEventStore, NewRunEvent, RunEventLog, StreamSettings};

fn log_with_capacity(capacity: usize) -> Arc<RunEventLog> {
    Arc::new(RunEventLog::new(
        Arc::new(MemoryEventStore::new()),
        EventBroker::new(capacity),
        Duration::from_secs(2),
        100,
    ))
}

fn event(kind: &str, n: usize) -> NewRunEvent {
    NewRunEvent {
        kind: kind.into(),
        persona: Some("writer".into()),
        payload: json!({ "n": n }),
    }
}

fn frame_seq(frame: &Bytes) -> Option<u64> {
    let text = std::str::from_utf8(frame).ok()?;
    text.strip_prefix("id: ")?.split('\n').next()?.parse().ok()
}

#[tokio::test]
async fn concurrent_appends_are_gap_free() {
    let log = log_with_capacity(64);
    let mut handles = Vec::new();
    for n in 0..25 {
        let log = log.clone();
        handles.push(tokio::spawn(async move { log.append("run-a", event("message", n)).await }));
    }
    let mut seqs: Vec<u64> = Vec::new();
    for handle in handles {
        seqs.push(handle.await.unwrap().unwrap().seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=25).collect::<Vec<u64>>());
    assert_eq!(log.last_seq("run-a").await.unwrap(), 25);

    // Sequences are per run
    assert_eq!(log.append("run-b", event("message", 0)).await.unwrap().seq, 1);
}

#[tokio::test]
async fn replay_pages_cover_the_log_in_order() {
    let log = log_with_capacity(8);
    for n in 0..7 {
        log.append("run-a", event("thought", n)).await.unwrap();
    }

    let mut cursor = 0;
    let mut seen = Vec::new();
    loop {
        let page = log.replay("run-a", cursor, 3).await.unwrap();
        seen.extend(page.events.iter().map(|e| e.seq));
        cursor = page.next_cursor;
        if !page.has_more {
            break;
        }
    }
    assert_eq!(seen, (1..=7).collect::<Vec<u64>>());

    let empty = log.replay("run-a", 7, 3).await.unwrap();
    assert!(empty.events.is_empty());
    assert_eq!(empty.next_cursor, 7);
    assert!(!empty.has_more);

    // A cursor beyond any stored sequence is an empty page, not a rewind
    let beyond = log.replay("run-a", u64::MAX, 3).await.unwrap();
    assert!(beyond.events.is_empty());
    assert!(!beyond.has_more);
}

#[tokio::test]
async fn subscribers_receive_in_sequence_order() {
    let log = log_with_capacity(64);
    let mut sub = log.subscribe("run-a");
    for n in 0..10 {
        log.append("run-a", event("message", n)).await.unwrap();
    }
    for expected in 1..=10 {
        let received = sub.recv().await.unwrap();
        assert_eq!(received.seq, expected);
        assert_eq!(received.run_id, "run-a");
    }
}

#[tokio::test]
async fn key_nodes_are_flagged() {
    let log = log_with_capacity(8);
    assert!(log.append("run-a", event("decision", 0)).await.unwrap().is_key_node);
    assert!(!log.append("run-a", event("message", 1)).await.unwrap().is_key_node);
    assert!(!log.append("run-a", event("custom_kind", 2)).await.unwrap().is_key_node);
}

#[tokio::test]
async fn stream_closes_dropped_frame_gaps_by_replay() {
    // One-slot subscriber queue: bursts overflow and frames are dropped
    let log = log_with_capacity(1);
    let settings = StreamSettings {
        keepalive: Duration::from_secs(30),
        backfill_batch: 2,
    };
    let mut rx = open_stream(log.clone(), "run-a".into(), 0, settings);
    tokio::time::sleep(Duration::from_millis(20)).await;

    for n in 0..8 {
        log.append("run-a", event("message", n)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    log.append("run-a", event("summary", 8)).await.unwrap();

    let mut seqs = Vec::new();
    while seqs.last() != Some(&9) {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("stream stalled")
            .expect("stream ended");
        if let Some(seq) = frame_seq(&frame) {
            seqs.push(seq);
        }
    }
    assert_eq!(seqs, (1..=9).collect::<Vec<u64>>());
}

#[tokio::test]
async fn dropping_the_stream_unsubscribes() {
    let log = log_with_capacity(4);
    let rx = open_stream(
        log.clone(),
        "run-a".into(),
        0,
        StreamSettings {
            keepalive: Duration::from_millis(20),
            backfill_batch: 10,
        },
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(log.broker().subscriber_count("run-a"), 1);

    drop(rx);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log.broker().subscriber_count("run-a"), 0);
}
