//! Work item storage contract and in-memory backend
//!
//! The store owns atomicity: claim, complete and the sweeps must each be
//! applied as one unit against concurrent callers, possibly in other
//! processes. The MongoDB backend lives in `work::mongo`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::types::{AgoraError, Result};

use super::types::{ClaimedWorkItem, WorkItem, WorkItemLease, WorkItemStatus};

/// Transactional work item storage
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Insert a new work item
    async fn insert_item(&self, item: WorkItem) -> Result<WorkItem>;

    /// Offer a work item to agents (idempotent per pair)
    async fn add_offers(&self, work_item_id: &str, agent_ids: &[String], now: DateTime<Utc>) -> Result<()>;

    async fn get_item(&self, work_item_id: &str) -> Result<Option<WorkItem>>;

    async fn has_offer(&self, work_item_id: &str, agent_id: &str) -> Result<bool>;

    async fn get_lease(&self, work_item_id: &str) -> Result<Option<WorkItemLease>>;

    /// Offered items available to an agent, oldest first
    async fn list_offered(&self, agent_id: &str, limit: usize) -> Result<Vec<WorkItem>>;

    /// Claim one item; a lost race reports [`AgoraError::Conflict`]
    async fn claim(
        &self,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<ClaimedWorkItem>;

    /// Claim the oldest offered item, skipping any another claimant holds
    async fn claim_next(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<Option<ClaimedWorkItem>>;

    /// Complete a claimed item and credit the agent's owner
    async fn complete(&self, work_item_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<WorkItem>;

    /// Flip scheduled items whose time has come to offered
    async fn promote_scheduled(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Drop every lease an agent holds and re-offer the items
    async fn release_agent(&self, agent_id: &str, now: DateTime<Utc>) -> Result<u64>;

    /// Drop expired leases and re-offer their items
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Completed work items credited to an owner
    async fn contribution_count(&self, owner_id: &str) -> Result<u64>;
}

/// Whether a claim should create a fresh lease or replace an expired one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPath {
    Fresh,
    TakeOverExpired,
}

/// Decide whether `item` may be claimed right now.
///
/// Shared by every backend so the rules cannot drift. Offer existence is
/// checked by the caller before this.
pub fn check_claimable(
    item: &WorkItem,
    lease: Option<&WorkItemLease>,
    now: DateTime<Utc>,
) -> Result<ClaimPath> {
    match item.status {
        WorkItemStatus::Offered => match lease {
            None => Ok(ClaimPath::Fresh),
            // Stale lease left behind by a crashed writer
            Some(l) if l.is_expired(now) => Ok(ClaimPath::TakeOverExpired),
            Some(_) => Err(AgoraError::Conflict("work item already claimed".into())),
        },
        WorkItemStatus::Claimed => match lease {
            Some(l) if l.is_expired(now) => Ok(ClaimPath::TakeOverExpired),
            _ => Err(AgoraError::Conflict("work item already claimed".into())),
        },
        WorkItemStatus::Scheduled => Err(AgoraError::Conflict("work item is not offered yet".into())),
        WorkItemStatus::Completed => Err(AgoraError::Conflict("work item already completed".into())),
    }
}

/// Decide whether `agent_id` may complete `item` under `lease`
pub fn check_completable(
    item: &WorkItem,
    lease: Option<&WorkItemLease>,
    agent_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(lease) = lease else {
        return Err(match item.status {
            WorkItemStatus::Completed => AgoraError::Conflict("work item already completed".into()),
            _ => AgoraError::Conflict("work item is not claimed".into()),
        });
    };

    if lease.agent_id != agent_id {
        return Err(AgoraError::Forbidden("caller does not hold the lease".into()));
    }

    if lease.is_expired(now) {
        return Err(AgoraError::Conflict("lease expired; claim the work item again".into()));
    }

    Ok(())
}

fn new_lease(work_item_id: &str, agent_id: &str, now: DateTime<Utc>, ttl: Duration) -> WorkItemLease {
    WorkItemLease {
        work_item_id: work_item_id.to_string(),
        agent_id: agent_id.to_string(),
        expires_at: now + ttl,
        created_at: now,
    }
}

#[derive(Default)]
struct MemoryWorkState {
    items: HashMap<String, WorkItem>,
    offers: HashSet<(String, String)>,
    leases: HashMap<String, WorkItemLease>,
    contributions: HashMap<String, u64>,
    owners: HashMap<String, String>,
}

impl MemoryWorkState {
    fn claim_locked(
        &mut self,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<ClaimedWorkItem> {
        let item = self
            .items
            .get(work_item_id)
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;

        if !self.offers.contains(&(work_item_id.to_string(), agent_id.to_string())) {
            return Err(AgoraError::Forbidden("work item is not offered to this agent".into()));
        }

        check_claimable(item, self.leases.get(work_item_id), now)?;

        let lease = new_lease(work_item_id, agent_id, now, ttl);
        self.leases.insert(work_item_id.to_string(), lease.clone());

        let item = self
            .items
            .get_mut(work_item_id)
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        item.status = WorkItemStatus::Claimed;
        item.updated_at = now;

        Ok(ClaimedWorkItem {
            work_item: item.clone(),
            lease,
        })
    }

    fn reoffer(&mut self, work_item_id: &str, now: DateTime<Utc>) {
        if let Some(item) = self.items.get_mut(work_item_id) {
            if item.status == WorkItemStatus::Claimed {
                item.status = WorkItemStatus::Offered;
                item.updated_at = now;
            }
        }
    }
}

/// In-memory work store for dev mode and tests.
///
/// One mutex serializes every operation, which trivially gives the
/// atomicity the trait demands.
#[derive(Default)]
pub struct MemoryWorkStore {
    state: Mutex<MemoryWorkState>,
}

impl MemoryWorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record which owner an agent's contributions are credited to
    pub async fn register_agent_owner(&self, agent_id: &str, owner_id: &str) {
        self.state
            .lock()
            .await
            .owners
            .insert(agent_id.to_string(), owner_id.to_string());
    }
}

#[async_trait]
impl WorkStore for MemoryWorkStore {
    async fn insert_item(&self, item: WorkItem) -> Result<WorkItem> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            return Err(AgoraError::Conflict(format!("work item {} already exists", item.id)));
        }
        state.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn add_offers(&self, work_item_id: &str, agent_ids: &[String], _now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(work_item_id) {
            return Err(AgoraError::NotFound(format!("work item {}", work_item_id)));
        }
        for agent_id in agent_ids {
            state.offers.insert((work_item_id.to_string(), agent_id.clone()));
        }
        Ok(())
    }

    async fn get_item(&self, work_item_id: &str) -> Result<Option<WorkItem>> {
        Ok(self.state.lock().await.items.get(work_item_id).cloned())
    }

    async fn has_offer(&self, work_item_id: &str, agent_id: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .offers
            .contains(&(work_item_id.to_string(), agent_id.to_string())))
    }

    async fn get_lease(&self, work_item_id: &str) -> Result<Option<WorkItemLease>> {
        Ok(self.state.lock().await.leases.get(work_item_id).cloned())
    }

    async fn list_offered(&self, agent_id: &str, limit: usize) -> Result<Vec<WorkItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<WorkItem> = state
            .offers
            .iter()
            .filter(|(_, agent)| agent == agent_id)
            .filter_map(|(id, _)| state.items.get(id))
            .filter(|item| item.status == WorkItemStatus::Offered)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn claim(
        &self,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<ClaimedWorkItem> {
        self.state.lock().await.claim_locked(work_item_id, agent_id, now, lease_ttl)
    }

    async fn claim_next(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<Option<ClaimedWorkItem>> {
        let mut state = self.state.lock().await;

        let mut candidates: Vec<(DateTime<Utc>, String)> = state
            .offers
            .iter()
            .filter(|(_, agent)| agent == agent_id)
            .filter_map(|(id, _)| state.items.get(id))
            .filter(|item| item.status == WorkItemStatus::Offered)
            .map(|item| (item.created_at, item.id.clone()))
            .collect();
        candidates.sort();

        for (_, id) in candidates {
            match state.claim_locked(&id, agent_id, now, lease_ttl) {
                Ok(claimed) => return Ok(Some(claimed)),
                Err(AgoraError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn complete(&self, work_item_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<WorkItem> {
        let mut state = self.state.lock().await;

        let item = state
            .items
            .get(work_item_id)
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        check_completable(item, state.leases.get(work_item_id), agent_id, now)?;

        state.leases.remove(work_item_id);
        let owner = state
            .owners
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| agent_id.to_string());
        *state.contributions.entry(owner).or_insert(0) += 1;

        let item = state
            .items
            .get_mut(work_item_id)
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        item.status = WorkItemStatus::Completed;
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn promote_scheduled(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut promoted = 0;
        for item in state.items.values_mut() {
            let due = item.scheduled_at.map(|at| at <= now).unwrap_or(true);
            if item.status == WorkItemStatus::Scheduled && due {
                item.status = WorkItemStatus::Offered;
                item.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn release_agent(&self, agent_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let held: Vec<String> = state
            .leases
            .values()
            .filter(|lease| lease.agent_id == agent_id)
            .map(|lease| lease.work_item_id.clone())
            .collect();
        for id in &held {
            state.leases.remove(id);
            state.reoffer(id, now);
        }
        Ok(held.len() as u64)
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .leases
            .values()
            .filter(|lease| lease.is_expired(now))
            .map(|lease| lease.work_item_id.clone())
            .collect();
        for id in &expired {
            state.leases.remove(id);
            state.reoffer(id, now);
        }
        Ok(expired.len() as u64)
    }

    async fn contribution_count(&self, owner_id: &str) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .await
            .contributions
            .get(owner_id)
            .copied()
            .unwrap_or(0))
    }
}
