//! Work item scheduler
//!
//! Offer → claim → complete lifecycle over a [`WorkStore`], with every store
//! call bounded by the configured deadline. Conflicts are reported to the
//! caller as-is; nothing here retries.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::events::{NewRunEvent, RunEventLog};
use crate::types::{with_deadline, AgoraError, Result};

use super::store::WorkStore;
use super::types::{ClaimedWorkItem, NewWorkItem, WorkItem, WorkItemLease};

/// Largest page `list_offers` returns
pub const MAX_OFFER_PAGE: usize = 100;

pub struct WorkItemScheduler {
    store: Arc<dyn WorkStore>,
    lease_ttl: chrono::Duration,
    deadline: Duration,
}

/// A work item as seen by one agent
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkItemView {
    pub work_item: WorkItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<WorkItemLease>,
}

impl WorkItemScheduler {
    pub fn new(store: Arc<dyn WorkStore>, lease_ttl: Duration, deadline: Duration) -> Self {
        let lease_ttl = chrono::Duration::from_std(lease_ttl).unwrap_or_else(|_| chrono::Duration::minutes(15));
        Self {
            store,
            lease_ttl,
            deadline,
        }
    }

    /// Create a work item and offer it to `agent_ids`
    pub async fn create(&self, new: NewWorkItem, agent_ids: &[String]) -> Result<WorkItem> {
        if new.run_id.is_empty() || new.stage.is_empty() || new.kind.is_empty() {
            return Err(AgoraError::BadRequest("run_id, stage and kind are required".into()));
        }
        let now = Utc::now();
        let item = with_deadline(self.deadline, "insert_work_item", self.store.insert_item(new.into_item(now))).await?;
        if !agent_ids.is_empty() {
            with_deadline(self.deadline, "offer_work_item", self.store.add_offers(&item.id, agent_ids, now)).await?;
        }
        info!(
            work_item_id = %item.id,
            run_id = %item.run_id,
            status = %item.status,
            offers = agent_ids.len(),
            "Work item created"
        );
        Ok(item)
    }

    pub async fn offer(&self, work_item_id: &str, agent_ids: &[String]) -> Result<()> {
        with_deadline(
            self.deadline,
            "offer_work_item",
            self.store.add_offers(work_item_id, agent_ids, Utc::now()),
        )
        .await
    }

    /// Fetch an item the agent was offered or currently holds
    pub async fn get(&self, work_item_id: &str, agent_id: &str) -> Result<WorkItemView> {
        let item = with_deadline(self.deadline, "get_work_item", self.store.get_item(work_item_id))
            .await?
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        let lease = with_deadline(self.deadline, "get_work_item_lease", self.store.get_lease(work_item_id)).await?;

        let holds_lease = lease.as_ref().map(|l| l.agent_id == agent_id).unwrap_or(false);
        if !holds_lease {
            let offered = with_deadline(
                self.deadline,
                "get_work_item_offer",
                self.store.has_offer(work_item_id, agent_id),
            )
            .await?;
            if !offered {
                // Do not reveal items the caller cannot see
                return Err(AgoraError::NotFound(format!("work item {}", work_item_id)));
            }
        }

        Ok(WorkItemView {
            work_item: item,
            lease: lease.filter(|l| l.agent_id == agent_id),
        })
    }

    /// Offered items available to the agent, oldest first
    pub async fn list_offers(&self, agent_id: &str, limit: usize) -> Result<Vec<WorkItem>> {
        let limit = limit.clamp(1, MAX_OFFER_PAGE);
        with_deadline(self.deadline, "list_offers", self.store.list_offered(agent_id, limit)).await
    }

    pub async fn claim(&self, work_item_id: &str, agent_id: &str) -> Result<ClaimedWorkItem> {
        let result = with_deadline(
            self.deadline,
            "claim_work_item",
            self.store.claim(work_item_id, agent_id, Utc::now(), self.lease_ttl),
        )
        .await;

        match &result {
            Ok(claimed) => info!(
                work_item_id,
                agent_id,
                expires_at = %claimed.lease.expires_at,
                "Work item claimed"
            ),
            Err(AgoraError::Conflict(reason)) => debug!(work_item_id, agent_id, reason = %reason, "Claim lost"),
            Err(e) => warn!(work_item_id, agent_id, error = %e, "Claim failed"),
        }
        result
    }

    pub async fn claim_next(&self, agent_id: &str) -> Result<Option<ClaimedWorkItem>> {
        let claimed = with_deadline(
            self.deadline,
            "claim_next_work_item",
            self.store.claim_next(agent_id, Utc::now(), self.lease_ttl),
        )
        .await?;
        if let Some(c) = &claimed {
            info!(work_item_id = %c.work_item.id, agent_id, "Work item claimed (next)");
        }
        Ok(claimed)
    }

    pub async fn complete(&self, work_item_id: &str, agent_id: &str) -> Result<WorkItem> {
        let item = with_deadline(
            self.deadline,
            "complete_work_item",
            self.store.complete(work_item_id, agent_id, Utc::now()),
        )
        .await?;
        info!(work_item_id, agent_id, run_id = %item.run_id, "Work item completed");
        Ok(item)
    }

    pub async fn promote_scheduled(&self) -> Result<u64> {
        with_deadline(self.deadline, "promote_scheduled", self.store.promote_scheduled(Utc::now())).await
    }

    /// Release every lease held by a removed agent
    pub async fn release_agent(&self, agent_id: &str) -> Result<u64> {
        let released = with_deadline(self.deadline, "release_agent", self.store.release_agent(agent_id, Utc::now())).await?;
        if released > 0 {
            info!(agent_id, released, "Released agent leases");
        }
        Ok(released)
    }

    pub async fn reap_expired(&self) -> Result<u64> {
        with_deadline(self.deadline, "reap_expired_leases", self.store.reap_expired(Utc::now())).await
    }

    pub async fn contribution_count(&self, owner_id: &str) -> Result<u64> {
        with_deadline(self.deadline, "contribution_count", self.store.contribution_count(owner_id)).await
    }
}

/// Periodically promote due scheduled items (and optionally reap expired
/// leases), announcing promotions on the platform run.
pub fn spawn_promotion_task(
    scheduler: Arc<WorkItemScheduler>,
    events: Arc<RunEventLog>,
    platform_run_id: String,
    interval: Duration,
    reap_expired: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            match scheduler.promote_scheduled().await {
                Ok(0) => {}
                Ok(promoted) => {
                    info!(promoted, "Promoted scheduled work items");
                    let event = NewRunEvent {
                        kind: "work_items_promoted".to_string(),
                        persona: None,
                        payload: json!({ "count": promoted }),
                    };
                    if let Err(e) = events.append(&platform_run_id, event).await {
                        warn!(error = %e, run_id = %platform_run_id, "Failed to record promotion event");
                    }
                }
                Err(e) => warn!(error = %e, "Scheduled work item promotion failed"),
            }

            if reap_expired {
                match scheduler.reap_expired().await {
                    Ok(0) => {}
                    Ok(reaped) => info!(reaped, "Reaped expired work item leases"),
                    Err(e) => warn!(error = %e, "Lease reaper failed"),
                }
            }
        }
    })
}
