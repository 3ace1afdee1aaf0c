//! HTTP route handlers
//!
//! Handlers return `Result<Response<BoxBody>>`; the server maps errors to
//! responses with [`error_response`].

pub mod capability;
pub mod events;
pub mod health;
pub mod keys;
pub mod manifests;
pub mod response;
pub mod work;

pub use health::{health_check, readiness_check, version_info};
pub use keys::handle_jwks;
pub use response::{error_response, json_response, not_found_response, preflight_response, to_boxed, BoxBody};
