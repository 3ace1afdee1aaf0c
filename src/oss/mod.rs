//! Object store access
//!
//! The object store and STS are external collaborators reached through the
//! [`ObjectStore`] and [`StsClient`] traits.

pub mod http;
pub mod keys;
pub mod policy;
pub mod store;
pub mod sts;

pub use http::HttpObjectStore;
pub use keys::ObjectKeys;
pub use policy::{AccessPolicy, WriteGrant};
pub use store::{get_json, put_json, MemoryObjectStore, ObjectStore, ObjectStoreError, UnconfiguredObjectStore};
pub use sts::{AssumeRoleRequest, HttpStsClient, LocalStsClient, StsClient, StsCredentials, UnconfiguredStsClient};
