//! `GET /.well-known/agora-keys`
//!
//! Every key in the signing ring, revoked ones included, so certificates
//! minted before a rotation stay verifiable by `key_id`.

use hyper::{Response, StatusCode};
use std::sync::Arc;

use crate::server::AppState;

use super::response::{json_response, BoxBody};

pub async fn handle_jwks(state: Arc<AppState>) -> Response<BoxBody> {
    let jwks = state.signing.jwks().await;
    json_response(StatusCode::OK, &jwks)
}
