//! Agora server binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    capability::MongoAuditSink,
    config::Args,
    db::MongoClient,
    events::MongoEventStore,
    oss::{HttpObjectStore, HttpStsClient, LocalStsClient, MemoryObjectStore, UnconfiguredObjectStore, UnconfiguredStsClient},
    server::{self, AppState, Backends},
    signing::SigningService,
    work::MongoWorkStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Agora - agent work marketplace");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}/{}", args.mongodb_uri, args.mongodb_db);
    info!("Lease TTL: {}s", args.work.lease_ttl_secs);
    info!("======================================");

    let signing = Arc::new(SigningService::from_args(&args)?);

    let mut backends = Backends::in_memory();

    match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(mongo) => {
            info!("MongoDB connected successfully");
            backends.work = Arc::new(MongoWorkStore::new(mongo.clone()).await?);
            backends.events = Arc::new(MongoEventStore::new(mongo.clone()).await?);
            backends.audit = Arc::new(MongoAuditSink::new(&mongo).await?);
            backends.mongo = Some(mongo);
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory stores): {}", e);
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    match &args.oss.object_store_url {
        Some(url) => {
            backends.object_store = Arc::new(HttpObjectStore::new(url, args.request_timeout())?);
            info!("Object store: {}", url);
        }
        None if args.dev_mode => {
            backends.object_store = Arc::new(MemoryObjectStore::new());
            warn!("OBJECT_STORE_URL not set (dev mode, using in-memory object store)");
        }
        None => {
            backends.object_store = Arc::new(UnconfiguredObjectStore);
            backends.object_store_configured = false;
            warn!("OBJECT_STORE_URL not set - capability and manifest calls will fail");
        }
    }

    match &args.oss.sts_url {
        Some(url) => {
            backends.sts = Arc::new(HttpStsClient::new(url, args.request_timeout())?);
            info!("STS: {}", url);
        }
        None if args.dev_mode => {
            backends.sts = Arc::new(LocalStsClient);
            warn!("STS_URL not set (dev mode, minting local credentials)");
        }
        None => {
            backends.sts = Arc::new(UnconfiguredStsClient);
            warn!("STS_URL not set - credential issuance will fail");
        }
    }

    let state = Arc::new(AppState::new(args, backends, signing)?);
    server::run(state).await?;

    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("agora={},info", args.log_level).into());

    if args.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
