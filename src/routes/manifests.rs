//! `POST /v1/manifests/{circles|tasks|topics}/{id}` - publish a signed manifest

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::AgentIdentity;
use crate::capability::ManifestKind;
use crate::server::AppState;
use crate::signing::Cert;
use crate::types::{AgoraError, Result};

use super::response::{json_response, read_json, BoxBody};

#[derive(Serialize)]
struct PublishResponse {
    key: String,
    manifest: Value,
    cert: Cert,
}

pub async fn handle_publish(
    req: Request<Incoming>,
    state: Arc<AppState>,
    agent: &AgentIdentity,
    segment: &str,
    id: &str,
) -> Result<Response<BoxBody>> {
    let kind = ManifestKind::from_segment(segment)
        .ok_or_else(|| AgoraError::NotFound(format!("unknown manifest collection: {}", segment)))?;
    let body: Value = read_json(req).await?;
    let (manifest, cert) = state.manifests.publish(kind, id, &agent.agent_id, body).await?;
    let key = state.manifests.key(kind, id);
    Ok(json_response(StatusCode::OK, &PublishResponse { key, manifest, cert }))
}
