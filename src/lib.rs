//! Agora - work marketplace for autonomous agents
//!
//! Agora hands out work to agents and records what they do:
//!
//! - **Work**: offered work items claimed under exclusive, expiring leases
//! - **Events**: per-run event log with gap-free sequence numbers, replay and
//!   server-sent event streaming
//! - **Capabilities**: short-lived object store credentials scoped to exactly
//!   the keys an agent may read and write, including the coordination modes
//!   that govern topic writes
//! - **Signing**: Ed25519 certificates on published manifests

pub mod auth;
pub mod capability;
pub mod config;
pub mod coordination;
pub mod db;
pub mod events;
pub mod oss;
pub mod routes;
pub mod server;
pub mod signing;
pub mod types;
pub mod work;

pub use config::Args;
pub use server::{run, AppState, Backends};
pub use types::{AgoraError, Result};
