//! Work item domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::AgoraError;

/// Lifecycle of a work item.
///
/// Transitions only move forward: scheduled → offered → claimed → completed.
/// The single exception is re-offering after a released or expired lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Scheduled,
    Offered,
    Claimed,
    Completed,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Offered => "offered",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "offered" => Ok(Self::Offered),
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            other => Err(AgoraError::Internal(format!("unknown work item status '{}'", other))),
        }
    }
}

/// A discrete unit of work offered to agents within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub run_id: String,
    pub stage: String,
    pub kind: String,
    pub status: WorkItemStatus,
    /// Free-form context handed to the claiming agent
    #[serde(default)]
    pub context: serde_json::Value,
    /// Skills the agent may use while working the item
    #[serde(default)]
    pub available_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a work item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorkItem {
    #[serde(default)]
    pub id: Option<String>,
    pub run_id: String,
    pub stage: String,
    pub kind: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub available_skills: Vec<String>,
    /// Items with a future `scheduled_at` start as `scheduled`
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewWorkItem {
    /// Materialize the item, choosing the initial status from `scheduled_at`
    pub fn into_item(self, now: DateTime<Utc>) -> WorkItem {
        let status = match self.scheduled_at {
            Some(at) if at > now => WorkItemStatus::Scheduled,
            _ => WorkItemStatus::Offered,
        };

        WorkItem {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            run_id: self.run_id,
            stage: self.stage,
            kind: self.kind,
            status,
            context: self.context,
            available_skills: self.available_skills,
            scheduled_at: self.scheduled_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Exclusive, time-boxed claim on a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemLease {
    pub work_item_id: String,
    pub agent_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WorkItemLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a successful claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimedWorkItem {
    pub work_item: WorkItem,
    pub lease: WorkItemLease,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_initial_status_from_schedule() {
        let now = Utc::now();
        let immediate = NewWorkItem {
            run_id: "run-1".into(),
            stage: "draft".into(),
            kind: "write".into(),
            ..Default::default()
        };
        assert_eq!(immediate.into_item(now).status, WorkItemStatus::Offered);

        let later = NewWorkItem {
            run_id: "run-1".into(),
            stage: "draft".into(),
            kind: "write".into(),
            scheduled_at: Some(now + Duration::minutes(5)),
            ..Default::default()
        };
        assert_eq!(later.into_item(now).status, WorkItemStatus::Scheduled);
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            WorkItemStatus::Scheduled,
            WorkItemStatus::Offered,
            WorkItemStatus::Claimed,
            WorkItemStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<WorkItemStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<WorkItemStatus>().is_err());
    }

    #[test]
    fn test_lease_expiry_boundary() {
        let now = Utc::now();
        let lease = WorkItemLease {
            work_item_id: "w".into(),
            agent_id: "a".into(),
            expires_at: now,
            created_at: now - Duration::minutes(15),
        };
        assert!(lease.is_expired(now));
        assert!(!lease.is_expired(now - Duration::seconds(1)));
    }
}
