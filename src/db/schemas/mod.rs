//! Document schemas
//!
//! Each schema declares its indexes via [`IntoIndexes`](crate::db::IntoIndexes);
//! collections are created on first use by `MongoClient::collection`.

pub mod audit;
pub mod events;
pub mod work;

pub use audit::{CapabilityAuditDoc, CAPABILITY_AUDIT_COLLECTION};
pub use events::{RunDoc, RunEventDoc, RUN_COLLECTION, RUN_EVENT_COLLECTION};
pub use work::{
    AgentDoc, ContributionDoc, WorkItemDoc, WorkItemLeaseDoc, WorkItemOfferDoc, AGENT_COLLECTION,
    CONTRIBUTION_COLLECTION, WORK_ITEM_COLLECTION, WORK_ITEM_LEASE_COLLECTION, WORK_ITEM_OFFER_COLLECTION,
};
