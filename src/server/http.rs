//! HTTP server and request routing

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{authenticate, JwtValidator};
use crate::capability::{AuditSink, CapabilityIssuer, IssuerSettings, ManifestStore, MemoryAuditSink};
use crate::config::Args;
use crate::db::MongoClient;
use crate::events::{EventBroker, EventStore, MemoryEventStore, RunEventLog, StreamSettings};
use crate::oss::{LocalStsClient, MemoryObjectStore, ObjectKeys, ObjectStore, StsClient};
use crate::routes::{self, error_response, not_found_response, preflight_response, BoxBody};
use crate::signing::SigningService;
use crate::types::{AgoraError, Result};
use crate::work::{spawn_promotion_task, MemoryWorkStore, WorkItemScheduler, WorkStore};

/// Storage collaborators chosen at startup
pub struct Backends {
    pub mongo: Option<MongoClient>,
    pub work: Arc<dyn WorkStore>,
    pub events: Arc<dyn EventStore>,
    pub audit: Arc<dyn AuditSink>,
    pub object_store: Arc<dyn ObjectStore>,
    /// False when `object_store` is the unconfigured placeholder
    pub object_store_configured: bool,
    pub sts: Arc<dyn StsClient>,
}

impl Backends {
    /// Everything in process memory (dev mode and tests)
    pub fn in_memory() -> Self {
        Self {
            mongo: None,
            work: Arc::new(MemoryWorkStore::new()),
            events: Arc::new(MemoryEventStore::new()),
            audit: Arc::new(MemoryAuditSink::new()),
            object_store: Arc::new(MemoryObjectStore::new()),
            object_store_configured: true,
            sts: Arc::new(LocalStsClient),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub jwt: JwtValidator,
    pub scheduler: Arc<WorkItemScheduler>,
    pub events: Arc<RunEventLog>,
    pub stream: StreamSettings,
    pub signing: Arc<SigningService>,
    pub manifests: Arc<ManifestStore>,
    pub issuer: CapabilityIssuer,
    pub object_store_configured: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, backends: Backends, signing: Arc<SigningService>) -> Result<Self> {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| AgoraError::Config("JWT_SECRET is required".into()))?;
        let jwt = JwtValidator::new(secret, args.jwt_expiry_seconds)?;
        let deadline = args.request_timeout();

        let scheduler = Arc::new(WorkItemScheduler::new(
            backends.work,
            Duration::from_secs(args.work.lease_ttl_secs),
            deadline,
        ));
        let events = Arc::new(RunEventLog::new(
            backends.events,
            EventBroker::new(args.stream.broker_queue_capacity),
            deadline,
            args.stream.replay_max_limit,
        ));
        let stream = StreamSettings {
            keepalive: Duration::from_secs(args.stream.keepalive_secs.max(1)),
            backfill_batch: args.stream.backfill_batch,
        };

        let keys = ObjectKeys::new(&args.oss.base_prefix);
        let manifests = Arc::new(
            ManifestStore::new(backends.object_store.clone(), keys.clone(), signing.clone())
                .with_require_signed(args.signing.require_signed_manifests),
        );
        let issuer = CapabilityIssuer::new(
            backends.object_store,
            keys,
            manifests.clone(),
            backends.sts,
            backends.audit,
            IssuerSettings::from(&args.oss),
            deadline,
        );

        Ok(Self {
            args,
            mongo: backends.mongo,
            jwt,
            scheduler,
            events,
            stream,
            signing,
            manifests,
            issuer,
            object_store_configured: backends.object_store_configured,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(listen = %state.args.listen, node_id = %state.args.node_id, "Agora listening");

    if state.args.dev_mode {
        warn!("Development mode enabled - X-Agent-Id header accepted without a token");
    }

    spawn_promotion_task(
        Arc::clone(&state.scheduler),
        Arc::clone(&state.events),
        state.args.platform_run_id.clone(),
        Duration::from_secs(state.args.work.promote_interval_secs.max(1)),
        state.args.work.lease_reaper_enabled,
    );
    info!(
        interval_secs = state.args.work.promote_interval_secs,
        reaper = state.args.work.lease_reaper_enabled,
        "Scheduled work item promotion started"
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
pub async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(Arc::clone(&state)).await,

        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => routes::readiness_check(Arc::clone(&state)).await,

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::GET, "/.well-known/agora-keys") => routes::handle_jwks(Arc::clone(&state)).await,

        (_, p) if p.starts_with("/v1/") => match route_v1(req, Arc::clone(&state), &method, &path).await {
            Ok(response) => response,
            Err(e) => error_response(&e),
        },

        _ => not_found_response(&path),
    };

    Ok(response)
}

/// Authenticated API under `/v1/`
async fn route_v1(
    req: Request<Incoming>,
    state: Arc<AppState>,
    method: &Method,
    path: &str,
) -> Result<Response<BoxBody>> {
    let agent = authenticate(req.headers(), &state.jwt, state.args.dev_mode)?;

    let decoded: Vec<Cow<'_, str>> = path
        .trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .map(|s| urlencoding::decode(s).map_err(|_| AgoraError::BadRequest("invalid path encoding".into())))
        .collect::<Result<_>>()?;
    let segments: Vec<&str> = decoded.iter().map(|s| s.as_ref()).collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["v1", "work", "offers"]) => routes::work::handle_list_offers(&req, state, &agent).await,
        (&Method::GET, ["v1", "work", "items", id]) => routes::work::handle_get_item(state, &agent, id).await,
        (&Method::POST, ["v1", "work", "items", id, "claim"]) => routes::work::handle_claim(state, &agent, id).await,
        (&Method::POST, ["v1", "work", "items", id, "complete"]) => {
            routes::work::handle_complete(state, &agent, id).await
        }
        (&Method::POST, ["v1", "work", "claim-next"]) => routes::work::handle_claim_next(state, &agent).await,

        (&Method::POST, ["v1", "runs", run_id, "events"]) => {
            routes::events::handle_append(req, state, &agent, run_id).await
        }
        (&Method::GET, ["v1", "runs", run_id, "events"]) => routes::events::handle_replay(&req, state, run_id).await,
        (&Method::GET, ["v1", "runs", run_id, "events", "stream"]) => {
            routes::events::handle_stream(&req, state, run_id).await
        }

        (&Method::POST, ["v1", "capabilities", "oss"]) => routes::capability::handle_issue(req, state, &agent).await,

        (&Method::POST, ["v1", "manifests", collection, id]) => {
            routes::manifests::handle_publish(req, state, &agent, collection, id).await
        }

        _ => Ok(not_found_response(path)),
    }
}
