//! Run event log: persistence plus live publish

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{with_deadline, AgoraError, Result};

use super::broker::{EventBroker, Subscription};
use super::store::EventStore;
use super::types::{is_key_node, NewRunEvent, RunEvent};

/// One page of a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayPage {
    pub events: Vec<RunEvent>,
    /// Cursor to pass as `after` for the next page
    pub next_cursor: u64,
    pub has_more: bool,
}

pub struct RunEventLog {
    store: Arc<dyn EventStore>,
    broker: EventBroker,
    deadline: Duration,
    max_page: usize,
}

impl RunEventLog {
    pub fn new(store: Arc<dyn EventStore>, broker: EventBroker, deadline: Duration, max_page: usize) -> Self {
        Self {
            store,
            broker,
            deadline,
            max_page: max_page.max(1),
        }
    }

    pub fn broker(&self) -> &EventBroker {
        &self.broker
    }

    /// Persist an event under the next sequence number and publish it
    pub async fn append(&self, run_id: &str, event: NewRunEvent) -> Result<RunEvent> {
        if run_id.trim().is_empty() {
            return Err(AgoraError::BadRequest("run id is required".into()));
        }
        if event.kind.trim().is_empty() {
            return Err(AgoraError::BadRequest("event kind is required".into()));
        }

        let key_node = is_key_node(&event.kind);
        let appended = with_deadline(
            self.deadline,
            "append_run_event",
            self.store.append(run_id, event, key_node, Utc::now()),
        )
        .await?;

        let delivered = self.broker.publish(&appended);
        if appended.is_key_node {
            info!(run_id, seq = appended.seq, kind = %appended.kind, delivered, "Key run event appended");
        } else {
            debug!(run_id, seq = appended.seq, kind = %appended.kind, delivered, "Run event appended");
        }
        Ok(appended)
    }

    /// Paginated replay of events after `after`
    pub async fn replay(&self, run_id: &str, after: u64, limit: usize) -> Result<ReplayPage> {
        let limit = limit.clamp(1, self.max_page);
        let mut events = with_deadline(
            self.deadline,
            "replay_run_events",
            self.store.list_after(run_id, after, limit + 1),
        )
        .await?;

        let has_more = events.len() > limit;
        events.truncate(limit);
        let next_cursor = events.last().map(|e| e.seq).unwrap_or(after);
        Ok(ReplayPage {
            events,
            next_cursor,
            has_more,
        })
    }

    pub async fn last_seq(&self, run_id: &str) -> Result<u64> {
        with_deadline(self.deadline, "last_run_seq", self.store.last_seq(run_id)).await
    }

    pub fn subscribe(&self, run_id: &str) -> Subscription {
        self.broker.subscribe(run_id)
    }
}
