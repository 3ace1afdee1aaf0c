//! Authentication for Agora
//!
//! Bearer-token validation (HS256). In dev mode an `X-Agent-Id` header
//! stands in for a token.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};

use hyper::HeaderMap;

use crate::types::{AgoraError, Result};

pub const AGENT_ID_HEADER: &str = "x-agent-id";

/// The admitted caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub owner_id: Option<String>,
}

/// Resolve the calling agent from request headers
pub fn authenticate(headers: &HeaderMap, jwt: &JwtValidator, dev_mode: bool) -> Result<AgentIdentity> {
    let auth_header = headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Some(token) = extract_token_from_header(auth_header) {
        let result = jwt.verify_token(token);
        if !result.valid {
            return Err(AgoraError::Unauthorized(
                result.error.unwrap_or_else(|| "Invalid token".into()),
            ));
        }
        let claims = result
            .claims
            .ok_or_else(|| AgoraError::Unauthorized("Invalid token".into()))?;
        return Ok(AgentIdentity {
            agent_id: claims.sub,
            owner_id: claims.owner_id,
        });
    }

    if dev_mode {
        if let Some(agent_id) = headers
            .get(AGENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Ok(AgentIdentity {
                agent_id: agent_id.to_string(),
                owner_id: None,
            });
        }
    }

    Err(AgoraError::Unauthorized("No token provided".into()))
}
