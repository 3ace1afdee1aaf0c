//! Work item routes
//!
//! - `GET  /v1/work/offers?limit=`          - poll items offered to the caller
//! - `GET  /v1/work/items/{id}`             - one item (offer or lease required)
//! - `POST /v1/work/items/{id}/claim`       - take the lease
//! - `POST /v1/work/claim-next`             - lease the oldest claimable offer
//! - `POST /v1/work/items/{id}/complete`    - finish a leased item
//!
//! Claims and completions are announced on the item's run. Recording that
//! event is best-effort; the lease outcome stands either way.

use bytes::Bytes;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::auth::AgentIdentity;
use crate::events::{EventKind, NewRunEvent};
use crate::server::AppState;
use crate::types::Result;
use crate::work::scheduler::MAX_OFFER_PAGE;
use crate::work::{ClaimedWorkItem, WorkItem};

use super::response::{bytes_response, json_response, query, BoxBody};

const DEFAULT_OFFER_PAGE: usize = 20;

#[derive(Debug, Default, Deserialize)]
struct OffersQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct OffersResponse {
    work_items: Vec<WorkItem>,
}

async fn record(state: &AppState, run_id: &str, kind: EventKind, payload: serde_json::Value) {
    let event = NewRunEvent {
        kind: kind.as_str().to_string(),
        persona: None,
        payload,
    };
    if let Err(e) = state.events.append(run_id, event).await {
        warn!(error = %e, run_id, kind = kind.as_str(), "Failed to record work item event");
    }
}

async fn record_claim(state: &AppState, claimed: &ClaimedWorkItem) {
    let payload = json!({
        "work_item_id": claimed.work_item.id,
        "agent_id": claimed.lease.agent_id,
        "stage": claimed.work_item.stage,
        "lease_expires_at": claimed.lease.expires_at,
    });
    record(state, &claimed.work_item.run_id, EventKind::WorkItemClaimed, payload).await;
}

pub async fn handle_list_offers(
    req: &Request<Incoming>,
    state: Arc<AppState>,
    agent: &AgentIdentity,
) -> Result<Response<BoxBody>> {
    let params: OffersQuery = query(req)?;
    let limit = params.limit.unwrap_or(DEFAULT_OFFER_PAGE).clamp(1, MAX_OFFER_PAGE);
    let work_items = state.scheduler.list_offers(&agent.agent_id, limit).await?;
    Ok(json_response(StatusCode::OK, &OffersResponse { work_items }))
}

pub async fn handle_get_item(state: Arc<AppState>, agent: &AgentIdentity, work_item_id: &str) -> Result<Response<BoxBody>> {
    let view = state.scheduler.get(work_item_id, &agent.agent_id).await?;
    Ok(json_response(StatusCode::OK, &view))
}

pub async fn handle_claim(state: Arc<AppState>, agent: &AgentIdentity, work_item_id: &str) -> Result<Response<BoxBody>> {
    let claimed = state.scheduler.claim(work_item_id, &agent.agent_id).await?;
    record_claim(&state, &claimed).await;
    Ok(json_response(StatusCode::OK, &claimed))
}

/// 204 when nothing offered to the caller is claimable
pub async fn handle_claim_next(state: Arc<AppState>, agent: &AgentIdentity) -> Result<Response<BoxBody>> {
    match state.scheduler.claim_next(&agent.agent_id).await? {
        Some(claimed) => {
            record_claim(&state, &claimed).await;
            Ok(json_response(StatusCode::OK, &claimed))
        }
        None => Ok(bytes_response(StatusCode::NO_CONTENT, "application/json", Bytes::new())),
    }
}

pub async fn handle_complete(state: Arc<AppState>, agent: &AgentIdentity, work_item_id: &str) -> Result<Response<BoxBody>> {
    let item = state.scheduler.complete(work_item_id, &agent.agent_id).await?;
    let payload = json!({
        "work_item_id": item.id,
        "agent_id": agent.agent_id,
        "stage": item.stage,
    });
    record(&state, &item.run_id, EventKind::WorkItemCompleted, payload).await;
    Ok(json_response(StatusCode::OK, &item))
}
