//! Work item documents

use bson::{doc, DateTime};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{unique, IntoIndexes};
use crate::types::AgoraError;
use crate::work::types::{WorkItem, WorkItemLease};

pub const WORK_ITEM_COLLECTION: &str = "work_items";
pub const WORK_ITEM_OFFER_COLLECTION: &str = "work_item_offers";
pub const WORK_ITEM_LEASE_COLLECTION: &str = "work_item_leases";
pub const CONTRIBUTION_COLLECTION: &str = "owner_contributions";
pub const AGENT_COLLECTION: &str = "agents";

/// Work item document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkItemDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub run_id: String,
    pub stage: String,
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub available_skills: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

impl IntoIndexes for WorkItemDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        vec![
            (doc! { "status": 1, "created_at": 1 }, None),
            (doc! { "status": 1, "scheduled_at": 1 }, None),
            (doc! { "run_id": 1 }, None),
        ]
    }
}

impl From<&WorkItem> for WorkItemDoc {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            run_id: item.run_id.clone(),
            stage: item.stage.clone(),
            kind: item.kind.clone(),
            status: item.status.as_str().to_string(),
            context: item.context.clone(),
            available_skills: item.available_skills.clone(),
            scheduled_at: item.scheduled_at.map(DateTime::from_chrono),
            created_at: Some(DateTime::from_chrono(item.created_at)),
            updated_at: Some(DateTime::from_chrono(item.updated_at)),
        }
    }
}

impl TryFrom<WorkItemDoc> for WorkItem {
    type Error = AgoraError;

    fn try_from(doc: WorkItemDoc) -> Result<Self, Self::Error> {
        let created_at = doc.created_at.map(|d| d.to_chrono()).unwrap_or_default();
        Ok(WorkItem {
            status: doc.status.parse()?,
            id: doc.id,
            run_id: doc.run_id,
            stage: doc.stage,
            kind: doc.kind,
            context: doc.context,
            available_skills: doc.available_skills,
            scheduled_at: doc.scheduled_at.map(|d| d.to_chrono()),
            created_at,
            updated_at: doc.updated_at.map(|d| d.to_chrono()).unwrap_or(created_at),
        })
    }
}

/// (work item, agent) offer; existence is the precondition for claiming
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkItemOfferDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub work_item_id: String,
    pub agent_id: String,
    /// Copied from the work item so offers sort oldest-first without a join
    pub item_created_at: Option<DateTime>,
    pub created_at: Option<DateTime>,
}

impl WorkItemOfferDoc {
    pub fn key(work_item_id: &str, agent_id: &str) -> String {
        format!("{}:{}", work_item_id, agent_id)
    }
}

impl IntoIndexes for WorkItemOfferDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        vec![
            (doc! { "work_item_id": 1, "agent_id": 1 }, unique()),
            (doc! { "agent_id": 1, "item_created_at": 1 }, None),
        ]
    }
}

/// Lease document; the unique index on `work_item_id` is the claim mutex
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkItemLeaseDoc {
    pub work_item_id: String,
    pub agent_id: String,
    pub expires_at: Option<DateTime>,
    pub created_at: Option<DateTime>,
}

impl IntoIndexes for WorkItemLeaseDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        vec![
            (doc! { "work_item_id": 1 }, unique()),
            (doc! { "agent_id": 1 }, None),
            (doc! { "expires_at": 1 }, None),
        ]
    }
}

impl From<&WorkItemLease> for WorkItemLeaseDoc {
    fn from(lease: &WorkItemLease) -> Self {
        Self {
            work_item_id: lease.work_item_id.clone(),
            agent_id: lease.agent_id.clone(),
            expires_at: Some(DateTime::from_chrono(lease.expires_at)),
            created_at: Some(DateTime::from_chrono(lease.created_at)),
        }
    }
}

impl From<WorkItemLeaseDoc> for WorkItemLease {
    fn from(doc: WorkItemLeaseDoc) -> Self {
        let created_at = doc.created_at.map(|d| d.to_chrono()).unwrap_or_default();
        WorkItemLease {
            work_item_id: doc.work_item_id,
            agent_id: doc.agent_id,
            // A lease without expiry is treated as already expired
            expires_at: doc.expires_at.map(|d| d.to_chrono()).unwrap_or(created_at),
            created_at,
        }
    }
}

/// Per-owner count of completed work items
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContributionDoc {
    #[serde(rename = "_id")]
    pub owner_id: String,
    pub completed_work_items: i64,
    pub updated_at: Option<DateTime>,
}

impl IntoIndexes for ContributionDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        Vec::new()
    }
}

/// Agent record maintained by the agent directory; read here for ownership
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl IntoIndexes for AgentDoc {
    fn into_indices() -> Vec<(bson::Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
