//! Capability issuance audit documents

use bson::{doc, DateTime};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::capability::audit::CapabilityAuditRecord;
use crate::db::mongo::IntoIndexes;

pub const CAPABILITY_AUDIT_COLLECTION: &str = "capability_audit";

/// One issued credential. Secrets are never stored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityAuditDoc {
    pub agent_id: String,
    pub kind: String,
    #[serde(default)]
    pub scope: serde_json::Value,
    #[serde(default)]
    pub read_prefixes: Vec<String>,
    #[serde(default)]
    pub write_keys: Vec<String>,
    pub expires_at: Option<DateTime>,
    pub issued_at: Option<DateTime>,
}

impl IntoIndexes for CapabilityAuditDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        vec![
            (doc! { "agent_id": 1, "issued_at": -1 }, None),
            (doc! { "kind": 1 }, None),
        ]
    }
}

impl From<&CapabilityAuditRecord> for CapabilityAuditDoc {
    fn from(record: &CapabilityAuditRecord) -> Self {
        Self {
            agent_id: record.agent_id.clone(),
            kind: record.kind.clone(),
            scope: record.scope.clone(),
            read_prefixes: record.read_prefixes.clone(),
            write_keys: record.write_keys.clone(),
            expires_at: Some(DateTime::from_chrono(record.expires_at)),
            issued_at: Some(DateTime::from_chrono(record.issued_at)),
        }
    }
}
