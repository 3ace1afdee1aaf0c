//! MongoDB-backed event store
//!
//! The run document's `last_seq` is incremented inside the same transaction
//! that inserts the event. Two appends to one run therefore write-conflict
//! on the run document and one of them retries, which serializes
//! allocation the way a row lock would.

use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::error::Error as MongoError;
use mongodb::options::ReturnDocument;
use mongodb::{ClientSession, Collection};
use std::time::Duration;
use tracing::debug;

use crate::db::mongo::{abort, is_contention, MongoClient};
use crate::db::schemas::{RunDoc, RunEventDoc, RUN_COLLECTION, RUN_EVENT_COLLECTION};
use crate::types::{AgoraError, Result};

use super::store::EventStore;
use super::types::{NewRunEvent, RunEvent};

/// Pause between attempts after a sequence allocation conflict
const CONFLICT_BACKOFF: Duration = Duration::from_millis(5);

/// Stored sequences are `i64`; cursors past that range saturate so they
/// still sort after every event
fn seq_cursor(after: u64) -> i64 {
    i64::try_from(after).unwrap_or(i64::MAX)
}

pub struct MongoEventStore {
    mongo: MongoClient,
    runs: Collection<RunDoc>,
    events: Collection<RunEventDoc>,
}

impl MongoEventStore {
    pub async fn new(mongo: MongoClient) -> Result<Self> {
        Ok(Self {
            runs: mongo.collection(RUN_COLLECTION).await?,
            events: mongo.collection(RUN_EVENT_COLLECTION).await?,
            mongo,
        })
    }

    async fn append_in(
        &self,
        session: &mut ClientSession,
        run_id: &str,
        event: &NewRunEvent,
        is_key_node: bool,
        now: DateTime<Utc>,
    ) -> std::result::Result<RunEvent, MongoError> {
        let run = self
            .runs
            .find_one_and_update(
                doc! { "_id": run_id },
                doc! {
                    "$inc": { "last_seq": 1_i64 },
                    "$setOnInsert": { "created_at": BsonDateTime::from_chrono(now) },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await?;
        let seq = run.map(|r| r.last_seq).unwrap_or(1);

        let event = RunEvent {
            run_id: run_id.to_string(),
            seq: seq.max(1) as u64,
            kind: event.kind.clone(),
            persona: event.persona.clone(),
            payload: event.payload.clone(),
            is_key_node,
            created_at: now,
        };
        self.events
            .insert_one(RunEventDoc::from(&event))
            .session(&mut *session)
            .await?;
        Ok(event)
    }
}

#[async_trait]
impl EventStore for MongoEventStore {
    async fn append(
        &self,
        run_id: &str,
        event: NewRunEvent,
        is_key_node: bool,
        now: DateTime<Utc>,
    ) -> Result<RunEvent> {
        // Bounded by the caller's deadline; contention only delays
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut session = self.mongo.begin().await?;
            let result = match self.append_in(&mut session, run_id, &event, is_key_node, now).await {
                Ok(appended) => session.commit_transaction().await.map(|_| appended),
                Err(e) => {
                    abort(session).await;
                    Err(e)
                }
            };

            match result {
                Ok(appended) => return Ok(appended),
                Err(e) if is_contention(&e) => {
                    debug!(run_id, attempt, "Sequence allocation conflict, retrying");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt.min(20)).await;
                }
                Err(e) => return Err(AgoraError::from(e)),
            }
        }
    }

    async fn list_after(&self, run_id: &str, after: u64, limit: usize) -> Result<Vec<RunEvent>> {
        let docs: Vec<RunEventDoc> = self
            .events
            .find(doc! { "run_id": run_id, "seq": { "$gt": seq_cursor(after) } })
            .sort(doc! { "seq": 1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await?
            .try_collect()
            .await?;
        Ok(docs.into_iter().map(RunEvent::from).collect())
    }

    async fn last_seq(&self, run_id: &str) -> Result<u64> {
        Ok(self
            .runs
            .find_one(doc! { "_id": run_id })
            .await?
            .map(|run| run.last_seq.max(0) as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_cursor_saturates() {
        assert_eq!(seq_cursor(0), 0);
        assert_eq!(seq_cursor(42), 42);
        assert_eq!(seq_cursor(i64::MAX as u64), i64::MAX);
        assert_eq!(seq_cursor(u64::MAX), i64::MAX);
    }
}
