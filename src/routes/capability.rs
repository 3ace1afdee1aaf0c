//! `POST /v1/capabilities/oss` - mint a scoped object store credential

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use crate::auth::AgentIdentity;
use crate::capability::CapabilityRequest;
use crate::server::AppState;
use crate::types::Result;

use super::response::{json_response, read_json, BoxBody};

pub async fn handle_issue(req: Request<Incoming>, state: Arc<AppState>, agent: &AgentIdentity) -> Result<Response<BoxBody>> {
    let request: CapabilityRequest = read_json(req).await?;
    let credential = state.issuer.issue(&agent.agent_id, &request).await?;
    Ok(json_response(StatusCode::OK, &credential))
}
