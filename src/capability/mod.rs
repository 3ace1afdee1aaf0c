//! Scoped object store credentials
//!
//! - `kind`: capability kinds agents may request
//! - `manifest`: signed circle/task/topic manifests
//! - `visibility`: who may see a resource
//! - `issuer`: policy assembly and credential minting
//! - `audit`: best-effort issuance records

pub mod audit;
pub mod issuer;
pub mod kind;
pub mod manifest;
pub mod visibility;

pub use audit::{AuditSink, CapabilityAuditRecord, MemoryAuditSink, MongoAuditSink};
pub use issuer::{CapabilityIssuer, CapabilityRequest, IssuerSettings, ScopedCredential};
pub use kind::CapabilityKind;
pub use manifest::{Manifest, ManifestKind, ManifestStore, Visibility};
