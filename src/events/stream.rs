//! Server-sent event stream for one run
//!
//! Subscribe first, then backfill from the client's cursor, then forward
//! live events. Anything at or below the cursor is skipped so backfill and
//! live delivery never duplicate. A gap in live delivery (dropped frames)
//! is closed by replaying from the cursor before continuing.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::types::Result;

use super::log::RunEventLog;
use super::types::RunEvent;

/// Frames buffered between the stream task and the HTTP body
const FRAME_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub keepalive: Duration,
    pub backfill_batch: usize,
}

/// Render one event as an SSE frame; `id` carries the sequence number
pub fn event_frame(event: &RunEvent) -> Bytes {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("id: {}\nevent: run_event\ndata: {}\n\n", event.seq, data))
}

pub fn keepalive_frame() -> Bytes {
    Bytes::from_static(b": keepalive\n\n")
}

fn error_frame(message: &str) -> Bytes {
    let data = serde_json::json!({ "error": message }).to_string();
    Bytes::from(format!("event: error\ndata: {}\n\n", data))
}

/// Start streaming `run_id` from `cursor`.
///
/// The returned receiver yields ready-to-write SSE frames. Dropping it
/// (client disconnect) ends the stream task and its broker subscription.
pub fn open_stream(
    log: Arc<RunEventLog>,
    run_id: String,
    cursor: u64,
    settings: StreamSettings,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(async move {
        info!(run_id = %run_id, cursor, "Event stream opened");
        let last = run_stream(&log, &run_id, cursor, settings, &tx).await;
        info!(run_id = %run_id, cursor = last, "Event stream closed");
    });
    rx
}

/// Send replayed events after `cursor` until caught up. Returns the new
/// cursor, or `None` once the client is gone.
async fn backfill(
    log: &RunEventLog,
    run_id: &str,
    mut cursor: u64,
    batch: usize,
    tx: &mpsc::Sender<Bytes>,
) -> Result<Option<u64>> {
    loop {
        let page = log.replay(run_id, cursor, batch).await?;
        for event in &page.events {
            if tx.send(event_frame(event)).await.is_err() {
                return Ok(None);
            }
            cursor = event.seq;
        }
        if !page.has_more || page.events.is_empty() {
            return Ok(Some(cursor));
        }
    }
}

async fn run_stream(
    log: &RunEventLog,
    run_id: &str,
    cursor: u64,
    settings: StreamSettings,
    tx: &mpsc::Sender<Bytes>,
) -> u64 {
    let mut subscription = log.subscribe(run_id);

    let mut cursor = match backfill(log, run_id, cursor, settings.backfill_batch, tx).await {
        Ok(Some(c)) => c,
        Ok(None) => return cursor,
        Err(e) => {
            warn!(run_id, error = %e, "Backfill failed");
            let _ = tx.send(error_frame(&e.public_message())).await;
            return cursor;
        }
    };

    let mut keepalive = interval_at(Instant::now() + settings.keepalive, settings.keepalive);

    loop {
        tokio::select! {
            _ = tx.closed() => break,

            received = subscription.recv() => {
                let Some(event) = received else { break };
                if event.seq <= cursor {
                    continue;
                }
                if event.seq > cursor + 1 {
                    debug!(run_id, cursor, seq = event.seq, dropped = subscription.dropped(), "Live gap, replaying");
                    match backfill(log, run_id, cursor, settings.backfill_batch, tx).await {
                        Ok(Some(c)) => cursor = c,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(run_id, error = %e, "Gap replay failed");
                            let _ = tx.send(error_frame(&e.public_message())).await;
                            break;
                        }
                    }
                    if event.seq <= cursor {
                        keepalive.reset();
                        continue;
                    }
                }
                if tx.send(event_frame(&event)).await.is_err() {
                    break;
                }
                cursor = event.seq;
                keepalive.reset();
            }

            _ = keepalive.tick() => {
                if tx.send(keepalive_frame()).await.is_err() {
                    break;
                }
            }
        }
    }
    cursor
}
