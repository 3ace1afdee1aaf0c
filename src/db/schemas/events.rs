//! Run and run event documents

use bson::{doc, DateTime};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{unique, IntoIndexes};
use crate::events::types::RunEvent;

pub const RUN_COLLECTION: &str = "runs";
pub const RUN_EVENT_COLLECTION: &str = "run_events";

/// Run document; `last_seq` is the per-run sequence high-water mark
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub last_seq: i64,
    pub created_at: Option<DateTime>,
}

impl IntoIndexes for RunDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        Vec::new()
    }
}

/// Run event document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunEventDoc {
    pub run_id: String,
    pub seq: i64,
    pub kind: String,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_key_node: bool,
    pub created_at: Option<DateTime>,
}

impl IntoIndexes for RunEventDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        vec![
            (doc! { "run_id": 1, "seq": 1 }, unique()),
            (doc! { "run_id": 1, "is_key_node": 1 }, None),
        ]
    }
}

impl From<&RunEvent> for RunEventDoc {
    fn from(event: &RunEvent) -> Self {
        Self {
            run_id: event.run_id.clone(),
            seq: event.seq as i64,
            kind: event.kind.clone(),
            persona: event.persona.clone(),
            payload: event.payload.clone(),
            is_key_node: event.is_key_node,
            created_at: Some(DateTime::from_chrono(event.created_at)),
        }
    }
}

impl From<RunEventDoc> for RunEvent {
    fn from(doc: RunEventDoc) -> Self {
        RunEvent {
            run_id: doc.run_id,
            seq: doc.seq.max(0) as u64,
            kind: doc.kind,
            persona: doc.persona,
            payload: doc.payload,
            is_key_node: doc.is_key_node,
            created_at: doc.created_at.map(|d| d.to_chrono()).unwrap_or_default(),
        }
    }
}
