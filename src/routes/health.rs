//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe (is the process serving?)
//! - /ready, /readyz - Readiness probe (database, object store and signing key available)
//! - /version - build information

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

use super::response::{json_response, BoxBody};

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded'
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub node_id: String,
    pub components: ComponentHealth,
}

/// Collaborator availability
#[derive(Serialize)]
pub struct ComponentHealth {
    /// MongoDB reachable, or in-memory stores in dev mode
    pub database: bool,
    pub object_store: bool,
    pub signing_key: bool,
}

impl ComponentHealth {
    fn all_ready(&self) -> bool {
        self.database && self.object_store && self.signing_key
    }
}

async fn component_health(state: &AppState) -> ComponentHealth {
    let database = match &state.mongo {
        Some(mongo) => mongo.ping().await,
        None => state.args.dev_mode,
    };
    ComponentHealth {
        database,
        object_store: state.object_store_configured,
        signing_key: state.signing.has_active_key().await,
    }
}

async fn build_health_response(state: &AppState) -> HealthResponse {
    let components = component_health(state).await;
    HealthResponse {
        healthy: true,
        status: if components.all_ready() { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode { "development" } else { "production" },
        node_id: state.args.node_id.to_string(),
        components,
    }
}

/// Handle liveness probe (/health, /healthz)
///
/// Always 200 while the process is serving; component status is informational.
pub async fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state).await;
    json_response(StatusCode::OK, &response)
}

/// Handle readiness probe (/ready, /readyz)
pub async fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state).await;
    let status = if response.components.all_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "agora",
    };
    json_response(StatusCode::OK, &response)
}
