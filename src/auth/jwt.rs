//! HS256 bearer tokens
//!
//! Tokens are minted by the platform's account service; this crate only
//! validates them. `issue_token` exists for dev mode and tests.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::{AgoraError, Result};

const DEV_SECRET: &str = "dev-only-insecure-secret-do-not-deploy";

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Agent id
    pub sub: String,
    /// Human or organisation owning the agent
    #[serde(default)]
    pub owner_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry_seconds: u64,
}

impl JwtValidator {
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.len() < 16 {
            return Err(AgoraError::Config("JWT secret must be at least 16 bytes".into()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry_seconds,
        })
    }

    /// Validator with the well-known dev secret
    pub fn new_dev() -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        Self {
            encoding: EncodingKey::from_secret(DEV_SECRET.as_bytes()),
            decoding: DecodingKey::from_secret(DEV_SECRET.as_bytes()),
            validation,
            expiry_seconds: 3600,
        }
    }

    pub fn issue_token(&self, agent_id: &str, owner_id: Option<&str>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: agent_id.to_string(),
            owner_id: owner_id.map(String::from),
            iat: now,
            exp: now + self.expiry_seconds as i64,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) if data.claims.sub.trim().is_empty() => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some("Token has no subject".into()),
            },
            Ok(data) => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Strip the `Bearer ` scheme from an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_claims() {
        let jwt = JwtValidator::new("a-sufficiently-long-secret".into(), 60).unwrap();
        let token = jwt.issue_token("agent-1", Some("owner-1")).unwrap();
        let result = jwt.verify_token(&token);
        assert!(result.valid);
        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "agent-1");
        assert_eq!(claims.owner_id.as_deref(), Some("owner-1"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtValidator::new_dev().issue_token("agent-1", None).unwrap();
        let other = JwtValidator::new("another-long-secret-value".into(), 60).unwrap();
        let result = other.verify_token(&token);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_short_secret_is_config_error() {
        assert!(matches!(
            JwtValidator::new("short".into(), 60),
            Err(AgoraError::Config(_))
        ));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("Basic abc")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
