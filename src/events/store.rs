//! Run event storage contract and in-memory backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::types::Result;

use super::types::{NewRunEvent, RunEvent};

/// Ordered, gap-free per-run event storage
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Allocate the next sequence number for `run_id` and persist the event.
    ///
    /// Allocation and insert are one atomic unit: concurrent appends to the
    /// same run are serialized and never produce gaps or duplicates.
    async fn append(
        &self,
        run_id: &str,
        event: NewRunEvent,
        is_key_node: bool,
        now: DateTime<Utc>,
    ) -> Result<RunEvent>;

    /// Events with `seq > after`, ascending, at most `limit`
    async fn list_after(&self, run_id: &str, after: u64, limit: usize) -> Result<Vec<RunEvent>>;

    /// Highest allocated sequence number (0 for an empty run)
    async fn last_seq(&self, run_id: &str) -> Result<u64>;
}

/// In-memory event store for dev mode and tests
#[derive(Default)]
pub struct MemoryEventStore {
    runs: Mutex<HashMap<String, Vec<RunEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        run_id: &str,
        event: NewRunEvent,
        is_key_node: bool,
        now: DateTime<Utc>,
    ) -> Result<RunEvent> {
        let mut runs = self.runs.lock().await;
        let log = runs.entry(run_id.to_string()).or_default();
        let event = RunEvent {
            run_id: run_id.to_string(),
            seq: log.len() as u64 + 1,
            kind: event.kind,
            persona: event.persona,
            payload: event.payload,
            is_key_node,
            created_at: now,
        };
        log.push(event.clone());
        Ok(event)
    }

    async fn list_after(&self, run_id: &str, after: u64, limit: usize) -> Result<Vec<RunEvent>> {
        let runs = self.runs.lock().await;
        Ok(runs
            .get(run_id)
            .map(|log| {
                // seq n lives at index n-1
                log.iter().skip(after as usize).take(limit).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn last_seq(&self, run_id: &str) -> Result<u64> {
        Ok(self
            .runs
            .lock()
            .await
            .get(run_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0))
    }
}
