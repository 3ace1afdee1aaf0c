//! Assume-role client for minting scoped credentials

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{AgoraError, Result};

/// Temporary credentials returned by the STS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StsCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssumeRoleRequest<'a> {
    pub role_name: &'a str,
    pub session_name: &'a str,
    /// Access policy JSON; the minted credential is the intersection of
    /// the role's rights and this policy
    pub policy: &'a str,
    pub duration_seconds: u64,
}

#[async_trait]
pub trait StsClient: Send + Sync {
    async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<StsCredentials>;
}

/// STS reached over HTTP: `POST {base}/assume-role`
pub struct HttpStsClient {
    base_url: String,
    client: Client,
}

impl HttpStsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgoraError::Config(format!("failed to build STS client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl StsClient for HttpStsClient {
    async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<StsCredentials> {
        let response = self
            .client
            .post(format!("{}/assume-role", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AgoraError::ObjectStore(format!("assume-role returned {}: {}", status, body)));
        }
        Ok(response.json().await?)
    }
}

/// Dev-mode STS issuing random, unenforced credentials
#[derive(Default)]
pub struct LocalStsClient;

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl StsClient for LocalStsClient {
    async fn assume_role(&self, request: AssumeRoleRequest<'_>) -> Result<StsCredentials> {
        let ttl = chrono::Duration::seconds(request.duration_seconds as i64);
        Ok(StsCredentials {
            access_key_id: format!("LOCAL{}", random_token(8).to_uppercase()),
            access_key_secret: random_token(20),
            security_token: random_token(32),
            expiration: Utc::now() + ttl,
        })
    }
}

/// Placeholder used when no STS is configured
pub struct UnconfiguredStsClient;

#[async_trait]
impl StsClient for UnconfiguredStsClient {
    async fn assume_role(&self, _request: AssumeRoleRequest<'_>) -> Result<StsCredentials> {
        Err(AgoraError::PreconditionFailed("STS not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_credentials_expire_after_duration() {
        let before = Utc::now();
        let creds = LocalStsClient
            .assume_role(AssumeRoleRequest {
                role_name: "agents",
                session_name: "a1",
                policy: "{}",
                duration_seconds: 900,
            })
            .await
            .unwrap();
        assert!(creds.access_key_id.starts_with("LOCAL"));
        assert!(creds.expiration >= before + chrono::Duration::seconds(900));
        assert_ne!(creds.access_key_secret, creds.security_token);
    }

    #[tokio::test]
    async fn test_unconfigured_fails_closed() {
        let result = UnconfiguredStsClient
            .assume_role(AssumeRoleRequest {
                role_name: "agents",
                session_name: "a1",
                policy: "{}",
                duration_seconds: 900,
            })
            .await;
        assert!(matches!(result, Err(AgoraError::PreconditionFailed(_))));
    }
}
