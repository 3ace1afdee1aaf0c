//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Upper bound on `CERT_TTL_DAYS`
pub const MAX_CERT_TTL_DAYS: i64 = 3650;

/// Agora - work marketplace for autonomous agents
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Work leasing, run event streams and scoped object-store credentials for agents")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory backends, header auth, ephemeral signing key)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// JWT secret for bearer token validation (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Lifetime of tokens minted by the validator, in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Deadline for every store operation, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,

    /// Work item settings
    #[command(flatten)]
    pub work: WorkArgs,

    /// Event stream settings
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Object store and STS settings
    #[command(flatten)]
    pub oss: OssArgs,

    /// Manifest signing settings
    #[command(flatten)]
    pub signing: SigningArgs,

    /// Platform user id (seed data, owner of platform-originated records)
    #[arg(long, env = "PLATFORM_USER_ID", default_value = "platform")]
    pub platform_user_id: String,

    /// Platform run id (receives platform events such as scheduled promotions)
    #[arg(long, env = "PLATFORM_RUN_ID", default_value = "platform")]
    pub platform_run_id: String,
}

/// Work item lease and sweep configuration
#[derive(Parser, Debug, Clone)]
pub struct WorkArgs {
    /// Lease lifetime granted on claim, in seconds
    #[arg(long, env = "LEASE_TTL_SECS", default_value = "900")]
    pub lease_ttl_secs: u64,

    /// Interval of the scheduled → offered promotion sweep, in seconds
    #[arg(long, env = "PROMOTE_INTERVAL_SECS", default_value = "15")]
    pub promote_interval_secs: u64,

    /// Re-offer work items whose lease expired without completion
    #[arg(long, env = "LEASE_REAPER_ENABLED", default_value = "false")]
    pub lease_reaper_enabled: bool,
}

/// Event stream configuration
#[derive(Parser, Debug, Clone)]
pub struct StreamArgs {
    /// Per-subscriber live queue capacity; frames beyond it are dropped
    #[arg(long, env = "BROKER_QUEUE_CAPACITY", default_value = "256")]
    pub broker_queue_capacity: usize,

    /// Idle keepalive interval for SSE streams, in seconds
    #[arg(long, env = "STREAM_KEEPALIVE_SECS", default_value = "15")]
    pub keepalive_secs: u64,

    /// Page size used when backfilling a stream from its cursor
    #[arg(long, env = "STREAM_BACKFILL_BATCH", default_value = "200")]
    pub backfill_batch: usize,

    /// Maximum page size for replay requests
    #[arg(long, env = "REPLAY_MAX_LIMIT", default_value = "500")]
    pub replay_max_limit: usize,
}

/// Object store and STS configuration
#[derive(Parser, Debug, Clone)]
pub struct OssArgs {
    /// Object store gateway URL (get/put/list/exists)
    #[arg(long, env = "OBJECT_STORE_URL")]
    pub object_store_url: Option<String>,

    /// STS endpoint URL (assume-role)
    #[arg(long, env = "STS_URL")]
    pub sts_url: Option<String>,

    /// Bucket name returned to agents
    #[arg(long, env = "OSS_BUCKET")]
    pub bucket: Option<String>,

    /// Object store endpoint returned to agents
    #[arg(long, env = "OSS_ENDPOINT", default_value = "")]
    pub endpoint: String,

    /// Object store region returned to agents
    #[arg(long, env = "OSS_REGION", default_value = "")]
    pub region: String,

    /// Role assumed when minting scoped credentials
    #[arg(long, env = "OSS_ROLE_NAME")]
    pub role_name: Option<String>,

    /// Key prefix all platform objects live under
    #[arg(long, env = "OSS_BASE_PREFIX", default_value = "")]
    pub base_prefix: String,

    /// Lifetime of minted credentials, in seconds
    #[arg(long, env = "CREDENTIAL_TTL_SECS", default_value = "900")]
    pub credential_ttl_secs: u64,
}

/// Manifest signing configuration
#[derive(Parser, Debug, Clone)]
pub struct SigningArgs {
    /// Active Ed25519 signing key (base64 32-byte seed)
    #[arg(long, env = "SIGNING_KEY")]
    pub signing_key: Option<String>,

    /// Key id for the active key (derived from the public key if unset)
    #[arg(long, env = "SIGNING_KEY_ID")]
    pub signing_key_id: Option<String>,

    /// Revoked keys kept for verification, as comma-separated `key_id:base64pubkey`
    #[arg(long, env = "SIGNING_RETIRED_KEYS")]
    pub retired_keys: Option<String>,

    /// Issuer name stamped into certificates
    #[arg(long, env = "SIGNING_ISSUER", default_value = "agora")]
    pub issuer: String,

    /// Certificate lifetime in days
    #[arg(long, env = "CERT_TTL_DAYS", default_value = "365")]
    pub cert_ttl_days: i64,

    /// Refuse manifests stored without a certificate
    #[arg(long, env = "REQUIRE_SIGNED_MANIFESTS", default_value = "false")]
    pub require_signed_manifests: bool,
}

impl Args {
    /// Deadline applied to every store operation
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret-do-not-deploy".to_string()),
            (None, false) => None,
        }
    }

    /// Parse `SIGNING_RETIRED_KEYS` into `(key_id, base64 public key)` pairs
    pub fn retired_key_list(&self) -> Vec<(String, String)> {
        self.signing
            .retired_keys
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|entry| {
                let (kid, key) = entry.split_once(':')?;
                Some((kid.trim().to_string(), key.trim().to_string()))
            })
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.signing.signing_key.is_none() {
                return Err("SIGNING_KEY is required in production mode".to_string());
            }
        }

        if !(1..=MAX_CERT_TTL_DAYS).contains(&self.signing.cert_ttl_days) {
            return Err(format!("CERT_TTL_DAYS must be between 1 and {}", MAX_CERT_TTL_DAYS));
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.work.lease_ttl_secs == 0 {
            return Err("LEASE_TTL_SECS must be greater than zero".to_string());
        }

        if self.stream.broker_queue_capacity == 0 {
            return Err("BROKER_QUEUE_CAPACITY must be greater than zero".to_string());
        }

        if self.stream.backfill_batch == 0 || self.stream.replay_max_limit == 0 {
            return Err("STREAM_BACKFILL_BATCH and REPLAY_MAX_LIMIT must be positive".to_string());
        }

        Ok(())
    }
}
