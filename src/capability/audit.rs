//! Capability issuance audit trail
//!
//! Audit writes are best-effort: the issuer logs a failed write and still
//! returns the credential.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::Collection;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::schemas::{CapabilityAuditDoc, CAPABILITY_AUDIT_COLLECTION};
use crate::db::MongoClient;
use crate::types::Result;

/// What was issued, to whom, until when. Never holds secrets.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityAuditRecord {
    pub agent_id: String,
    pub kind: String,
    pub scope: Value,
    pub read_prefixes: Vec<String>,
    pub write_keys: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &CapabilityAuditRecord) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<CapabilityAuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CapabilityAuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &CapabilityAuditRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

pub struct MongoAuditSink {
    collection: Collection<CapabilityAuditDoc>,
}

impl MongoAuditSink {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(CAPABILITY_AUDIT_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl AuditSink for MongoAuditSink {
    async fn record(&self, record: &CapabilityAuditRecord) -> Result<()> {
        self.collection.insert_one(CapabilityAuditDoc::from(record)).await?;
        Ok(())
    }
}
