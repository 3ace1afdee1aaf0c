//! MongoDB-backed work store
//!
//! Claim and complete run inside multi-document transactions. Mutual
//! exclusion comes from the unique index on `work_item_leases.work_item_id`:
//! a concurrent claimant either hits the duplicate key or a transaction
//! write conflict, and both surface as [`AgoraError::Conflict`].

use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::error::Error as MongoError;
use mongodb::{ClientSession, Collection};
use tracing::{debug, warn};

use crate::db::mongo::{abort, is_contention, MongoClient};
use crate::db::schemas::{
    AgentDoc, ContributionDoc, WorkItemDoc, WorkItemLeaseDoc, WorkItemOfferDoc, AGENT_COLLECTION,
    CONTRIBUTION_COLLECTION, WORK_ITEM_COLLECTION, WORK_ITEM_LEASE_COLLECTION, WORK_ITEM_OFFER_COLLECTION,
};
use crate::types::{AgoraError, Result};

use super::store::{check_claimable, check_completable, ClaimPath, WorkStore};
use super::types::{ClaimedWorkItem, WorkItem, WorkItemLease, WorkItemStatus};

/// Offers scanned per `claim_next` call
const CLAIM_NEXT_SCAN: i64 = 64;

fn claim_conflict(err: MongoError) -> AgoraError {
    if is_contention(&err) {
        AgoraError::Conflict("work item already claimed".into())
    } else {
        err.into()
    }
}

fn complete_conflict(err: MongoError) -> AgoraError {
    if is_contention(&err) {
        AgoraError::Conflict("work item changed concurrently; retry".into())
    } else {
        err.into()
    }
}

fn bson_time(at: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(at)
}

pub struct MongoWorkStore {
    mongo: MongoClient,
    items: Collection<WorkItemDoc>,
    offers: Collection<WorkItemOfferDoc>,
    leases: Collection<WorkItemLeaseDoc>,
    contributions: Collection<ContributionDoc>,
    agents: Collection<AgentDoc>,
}

impl MongoWorkStore {
    pub async fn new(mongo: MongoClient) -> Result<Self> {
        Ok(Self {
            items: mongo.collection(WORK_ITEM_COLLECTION).await?,
            offers: mongo.collection(WORK_ITEM_OFFER_COLLECTION).await?,
            leases: mongo.collection(WORK_ITEM_LEASE_COLLECTION).await?,
            contributions: mongo.collection(CONTRIBUTION_COLLECTION).await?,
            agents: mongo.collection(AGENT_COLLECTION).await?,
            mongo,
        })
    }

    async fn claim_in(
        &self,
        session: &mut ClientSession,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<ClaimedWorkItem> {
        let doc = self
            .items
            .find_one(doc! { "_id": work_item_id })
            .session(&mut *session)
            .await
            .map_err(claim_conflict)?
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        let mut item = WorkItem::try_from(doc)?;

        let offered = self
            .offers
            .find_one(doc! { "work_item_id": work_item_id, "agent_id": agent_id })
            .session(&mut *session)
            .await
            .map_err(claim_conflict)?
            .is_some();
        if !offered {
            return Err(AgoraError::Forbidden("work item is not offered to this agent".into()));
        }

        let lease = self
            .leases
            .find_one(doc! { "work_item_id": work_item_id })
            .session(&mut *session)
            .await
            .map_err(claim_conflict)?
            .map(WorkItemLease::from);

        if check_claimable(&item, lease.as_ref(), now)? == ClaimPath::TakeOverExpired {
            let removed = self
                .leases
                .delete_one(doc! {
                    "work_item_id": work_item_id,
                    "expires_at": { "$lte": bson_time(now) },
                })
                .session(&mut *session)
                .await
                .map_err(claim_conflict)?;
            if removed.deleted_count == 0 {
                return Err(AgoraError::Conflict("work item already claimed".into()));
            }
            debug!(work_item_id, agent_id, "Taking over expired lease");
        }

        let lease = WorkItemLease {
            work_item_id: work_item_id.to_string(),
            agent_id: agent_id.to_string(),
            expires_at: now + ttl,
            created_at: now,
        };
        self.leases
            .insert_one(WorkItemLeaseDoc::from(&lease))
            .session(&mut *session)
            .await
            .map_err(claim_conflict)?;

        let updated = self
            .items
            .update_one(
                doc! {
                    "_id": work_item_id,
                    "status": { "$in": [WorkItemStatus::Offered.as_str(), WorkItemStatus::Claimed.as_str()] },
                },
                doc! { "$set": { "status": WorkItemStatus::Claimed.as_str(), "updated_at": bson_time(now) } },
            )
            .session(&mut *session)
            .await
            .map_err(claim_conflict)?;
        if updated.matched_count == 0 {
            return Err(AgoraError::Conflict("work item already claimed".into()));
        }

        item.status = WorkItemStatus::Claimed;
        item.updated_at = now;
        Ok(ClaimedWorkItem { work_item: item, lease })
    }

    async fn complete_in(
        &self,
        session: &mut ClientSession,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkItem> {
        let doc = self
            .items
            .find_one(doc! { "_id": work_item_id })
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        let mut item = WorkItem::try_from(doc)?;

        let lease = self
            .leases
            .find_one(doc! { "work_item_id": work_item_id })
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?
            .map(WorkItemLease::from);
        check_completable(&item, lease.as_ref(), agent_id, now)?;

        let removed = self
            .leases
            .delete_one(doc! { "work_item_id": work_item_id, "agent_id": agent_id })
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?;
        if removed.deleted_count == 0 {
            return Err(AgoraError::Conflict("work item is not claimed".into()));
        }

        self.items
            .update_one(
                doc! { "_id": work_item_id },
                doc! { "$set": { "status": WorkItemStatus::Completed.as_str(), "updated_at": bson_time(now) } },
            )
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?;

        let owner = self
            .agents
            .find_one(doc! { "_id": agent_id })
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?
            .and_then(|agent| agent.owner_id)
            .unwrap_or_else(|| agent_id.to_string());

        self.contributions
            .update_one(
                doc! { "_id": &owner },
                doc! {
                    "$inc": { "completed_work_items": 1_i64 },
                    "$set": { "updated_at": bson_time(now) },
                },
            )
            .upsert(true)
            .session(&mut *session)
            .await
            .map_err(complete_conflict)?;

        item.status = WorkItemStatus::Completed;
        item.updated_at = now;
        Ok(item)
    }

    /// Drop one lease and re-offer its item. `expired_before` restricts the
    /// delete to leases that have run out.
    async fn release_one(
        &self,
        work_item_id: &str,
        agent_id: Option<&str>,
        expired_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut filter = doc! { "work_item_id": work_item_id };
        if let Some(agent_id) = agent_id {
            filter.insert("agent_id", agent_id);
        }
        if let Some(at) = expired_before {
            filter.insert("expires_at", doc! { "$lte": bson_time(at) });
        }

        let mut session = self.mongo.begin().await?;
        let result: std::result::Result<bool, MongoError> = async {
            let removed = self.leases.delete_one(filter).session(&mut session).await?;
            if removed.deleted_count == 0 {
                return Ok(false);
            }
            self.items
                .update_one(
                    doc! { "_id": work_item_id, "status": WorkItemStatus::Claimed.as_str() },
                    doc! { "$set": { "status": WorkItemStatus::Offered.as_str(), "updated_at": bson_time(now) } },
                )
                .session(&mut session)
                .await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(released) => {
                session.commit_transaction().await?;
                Ok(released)
            }
            Err(e) if is_contention(&e) => {
                abort(session).await;
                // Someone else moved the lease first; nothing left to release
                Ok(false)
            }
            Err(e) => {
                abort(session).await;
                Err(e.into())
            }
        }
    }

    /// Offered items for an agent, oldest first
    async fn offered_candidates(&self, agent_id: &str, limit: i64) -> Result<Vec<WorkItem>> {
        let rows: Vec<Document> = self
            .offers
            .aggregate(offered_candidates_pipeline(agent_id, limit))
            .await?
            .try_collect()
            .await?;
        rows.into_iter()
            .map(|row| {
                let item: WorkItemDoc = bson::from_document(row)
                    .map_err(|e| AgoraError::Internal(format!("malformed work item: {}", e)))?;
                WorkItem::try_from(item)
            })
            .collect()
    }
}

/// Offers of `agent_id` joined to their still-offered items, oldest first.
///
/// Status filter and limit run server-side so long offer histories stay in
/// the database.
fn offered_candidates_pipeline(agent_id: &str, limit: i64) -> Vec<Document> {
    vec![
        doc! { "$match": { "agent_id": agent_id } },
        doc! { "$sort": { "item_created_at": 1, "work_item_id": 1 } },
        doc! { "$lookup": {
            "from": WORK_ITEM_COLLECTION,
            "let": { "item_id": "$work_item_id" },
            "pipeline": [
                { "$match": {
                    "$expr": { "$eq": ["$_id", "$$item_id"] },
                    "status": WorkItemStatus::Offered.as_str(),
                } },
            ],
            "as": "item",
        } },
        doc! { "$unwind": "$item" },
        doc! { "$limit": limit },
        doc! { "$replaceRoot": { "newRoot": "$item" } },
    ]
}

#[async_trait]
impl WorkStore for MongoWorkStore {
    async fn insert_item(&self, item: WorkItem) -> Result<WorkItem> {
        self.items
            .insert_one(WorkItemDoc::from(&item))
            .await
            .map_err(|e| {
                if is_contention(&e) {
                    AgoraError::Conflict(format!("work item {} already exists", item.id))
                } else {
                    e.into()
                }
            })?;
        Ok(item)
    }

    async fn add_offers(&self, work_item_id: &str, agent_ids: &[String], now: DateTime<Utc>) -> Result<()> {
        let item = self
            .items
            .find_one(doc! { "_id": work_item_id })
            .await?
            .ok_or_else(|| AgoraError::NotFound(format!("work item {}", work_item_id)))?;
        let item_created_at = item.created_at.unwrap_or_else(|| bson_time(now));

        for agent_id in agent_ids {
            self.offers
                .update_one(
                    doc! { "_id": WorkItemOfferDoc::key(work_item_id, agent_id) },
                    doc! { "$setOnInsert": {
                        "work_item_id": work_item_id,
                        "agent_id": agent_id,
                        "item_created_at": item_created_at,
                        "created_at": bson_time(now),
                    } },
                )
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn get_item(&self, work_item_id: &str) -> Result<Option<WorkItem>> {
        self.items
            .find_one(doc! { "_id": work_item_id })
            .await?
            .map(WorkItem::try_from)
            .transpose()
    }

    async fn has_offer(&self, work_item_id: &str, agent_id: &str) -> Result<bool> {
        Ok(self
            .offers
            .find_one(doc! { "work_item_id": work_item_id, "agent_id": agent_id })
            .await?
            .is_some())
    }

    async fn get_lease(&self, work_item_id: &str) -> Result<Option<WorkItemLease>> {
        Ok(self
            .leases
            .find_one(doc! { "work_item_id": work_item_id })
            .await?
            .map(WorkItemLease::from))
    }

    async fn list_offered(&self, agent_id: &str, limit: usize) -> Result<Vec<WorkItem>> {
        self.offered_candidates(agent_id, limit as i64).await
    }

    async fn claim(
        &self,
        work_item_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<ClaimedWorkItem> {
        let mut session = self.mongo.begin().await?;
        match self.claim_in(&mut session, work_item_id, agent_id, now, lease_ttl).await {
            Ok(claimed) => {
                session.commit_transaction().await.map_err(claim_conflict)?;
                Ok(claimed)
            }
            Err(e) => {
                abort(session).await;
                Err(e)
            }
        }
    }

    async fn claim_next(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<Option<ClaimedWorkItem>> {
        for candidate in self.offered_candidates(agent_id, CLAIM_NEXT_SCAN).await? {
            match self.claim(&candidate.id, agent_id, now, lease_ttl).await {
                Ok(claimed) => return Ok(Some(claimed)),
                // Held by another claimant; move on instead of waiting
                Err(AgoraError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn complete(&self, work_item_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<WorkItem> {
        let mut session = self.mongo.begin().await?;
        match self.complete_in(&mut session, work_item_id, agent_id, now).await {
            Ok(item) => {
                session.commit_transaction().await.map_err(complete_conflict)?;
                Ok(item)
            }
            Err(e) => {
                abort(session).await;
                Err(e)
            }
        }
    }

    async fn promote_scheduled(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = self
            .items
            .update_many(
                doc! {
                    "status": WorkItemStatus::Scheduled.as_str(),
                    "$or": [
                        { "scheduled_at": { "$lte": bson_time(now) } },
                        { "scheduled_at": null },
                    ],
                },
                doc! { "$set": { "status": WorkItemStatus::Offered.as_str(), "updated_at": bson_time(now) } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn release_agent(&self, agent_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let held: Vec<WorkItemLeaseDoc> = self
            .leases
            .find(doc! { "agent_id": agent_id })
            .await?
            .try_collect()
            .await?;

        let mut released = 0;
        for lease in held {
            if self.release_one(&lease.work_item_id, Some(agent_id), None, now).await? {
                released += 1;
            }
        }
        Ok(released)
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired: Vec<WorkItemLeaseDoc> = self
            .leases
            .find(doc! { "expires_at": { "$lte": bson_time(now) } })
            .await?
            .try_collect()
            .await?;

        let mut reaped = 0;
        for lease in expired {
            match self.release_one(&lease.work_item_id, None, Some(now), now).await {
                Ok(true) => reaped += 1,
                Ok(false) => {}
                Err(e) => warn!(work_item_id = %lease.work_item_id, error = %e, "Failed to reap lease"),
            }
        }
        Ok(reaped)
    }

    async fn contribution_count(&self, owner_id: &str) -> Result<u64> {
        Ok(self
            .contributions
            .find_one(doc! { "_id": owner_id })
            .await?
            .map(|c| c.completed_work_items.max(0) as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage<'a>(pipeline: &'a [Document], name: &str) -> Option<(usize, &'a Document)> {
        pipeline
            .iter()
            .enumerate()
            .find_map(|(i, d)| d.get_document(name).ok().map(|s| (i, s)))
    }

    #[test]
    fn test_candidates_filter_status_before_limit() {
        let pipeline = offered_candidates_pipeline("a1", CLAIM_NEXT_SCAN);

        let (_, matched) = stage(&pipeline, "$match").unwrap();
        assert_eq!(matched.get_str("agent_id").unwrap(), "a1");

        let (lookup_at, lookup) = stage(&pipeline, "$lookup").unwrap();
        assert_eq!(lookup.get_str("from").unwrap(), WORK_ITEM_COLLECTION);
        let inner = lookup.get_array("pipeline").unwrap();
        let inner_match = inner[0].as_document().unwrap().get_document("$match").unwrap();
        assert_eq!(inner_match.get_str("status").unwrap(), "offered");

        let (limit_at, _) = pipeline
            .iter()
            .enumerate()
            .find(|(_, d)| d.contains_key("$limit"))
            .unwrap();
        assert_eq!(pipeline[limit_at].get_i64("$limit").unwrap(), CLAIM_NEXT_SCAN);
        assert!(limit_at > lookup_at);
    }
}
