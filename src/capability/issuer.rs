//! Capability Issuer
//!
//! Turns an admitted agent's request for object store access into a
//! short-lived credential whose policy covers only what the agent may touch
//! right now:
//!
//! 1. Read access to `discovery/` and the agent's own `agents/{id}/` area.
//! 2. For resource-scoped kinds, the resource's manifest must exist (404)
//!    and be visible to the caller (403).
//! 3. Topic writes ask the coordination engine for the one key (or, for
//!    freeform topics, the one prefix) the caller may write.
//! 4. The policy is rendered and sent to the STS; the issuance is audited
//!    on a best-effort basis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::OssArgs;
use crate::coordination::{CoordinationEngine, TopicRequest};
use crate::oss::{AccessPolicy, AssumeRoleRequest, ObjectKeys, ObjectStore, StsClient, WriteGrant};
use crate::types::{with_deadline, AgoraError, Result};

use super::audit::{AuditSink, CapabilityAuditRecord};
use super::kind::CapabilityKind;
use super::manifest::{require_safe_id, Manifest, ManifestKind, ManifestStore, Visibility};
use super::visibility::check_visibility;

/// STS session names are capped at 32 characters
const MAX_SESSION_NAME: usize = 32;

/// Body of `POST /v1/capabilities/oss`
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    #[serde(default)]
    pub circle_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Applicant whose join request a circle owner approves
    #[serde(default)]
    pub target_agent_id: Option<String>,
    /// Topic request sub-protocol payload for `topic_request_write`
    #[serde(default)]
    pub request: Option<TopicRequest>,
}

/// Credential handed back to the agent
#[derive(Debug, Clone, Serialize)]
pub struct ScopedCredential {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub base_prefix: String,
    /// Readable prefixes
    pub prefixes: Vec<String>,
    /// Writable keys, or prefixes ending in `/` for freeform namespaces
    pub write_keys: Vec<String>,
}

/// Deployment values stamped into every credential
#[derive(Debug, Clone)]
pub struct IssuerSettings {
    pub bucket: Option<String>,
    pub endpoint: String,
    pub region: String,
    pub role_name: Option<String>,
    pub credential_ttl: Duration,
}

impl From<&OssArgs> for IssuerSettings {
    fn from(args: &OssArgs) -> Self {
        Self {
            bucket: args.bucket.clone(),
            endpoint: args.endpoint.clone(),
            region: args.region.clone(),
            role_name: args.role_name.clone(),
            credential_ttl: Duration::from_secs(args.credential_ttl_secs),
        }
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    let id = value
        .as_deref()
        .ok_or_else(|| AgoraError::BadRequest(format!("{} is required", field)))?;
    require_safe_id(field, id)?;
    Ok(id)
}

fn session_name(agent_id: &str) -> String {
    let mut name = format!("agora-{}", agent_id);
    name.truncate(MAX_SESSION_NAME);
    name
}

pub struct CapabilityIssuer {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeys,
    manifests: Arc<ManifestStore>,
    engine: CoordinationEngine,
    sts: Arc<dyn StsClient>,
    audit: Arc<dyn AuditSink>,
    settings: IssuerSettings,
    deadline: Duration,
}

impl CapabilityIssuer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: ObjectKeys,
        manifests: Arc<ManifestStore>,
        sts: Arc<dyn StsClient>,
        audit: Arc<dyn AuditSink>,
        settings: IssuerSettings,
        deadline: Duration,
    ) -> Self {
        Self {
            engine: CoordinationEngine::new(store.clone(), keys.clone()),
            store,
            keys,
            manifests,
            sts,
            audit,
            settings,
            deadline,
        }
    }

    async fn visible(&self, kind: ManifestKind, id: &str, agent_id: &str) -> Result<Manifest> {
        let manifest = self.manifests.require(kind, id).await?;
        let own_circle = (kind == ManifestKind::Circle).then_some(id);
        check_visibility(self.store.as_ref(), &self.keys, &manifest, own_circle, agent_id).await?;
        Ok(manifest)
    }

    /// Fill `policy` with the kind-specific grants; returns the audit scope
    async fn scope(
        &self,
        agent_id: &str,
        request: &CapabilityRequest,
        policy: &mut AccessPolicy,
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let keys = &self.keys;
        match request.kind {
            CapabilityKind::RegistryRead => {
                policy.allow_read(keys.registry_prefix());
                Ok(json!({}))
            }
            CapabilityKind::RegistryWrite => {
                policy
                    .allow_read(keys.registry_prefix())
                    .allow_write(WriteGrant::Prefix(keys.registry_agent_prefix(agent_id)));
                Ok(json!({}))
            }
            CapabilityKind::TaskRead | CapabilityKind::TaskWrite => {
                let task_id = required("task_id", &request.task_id)?;
                self.visible(ManifestKind::Task, task_id, agent_id).await?;
                policy.allow_read(keys.task_prefix(task_id));
                if request.kind == CapabilityKind::TaskWrite {
                    policy.allow_write(WriteGrant::Prefix(keys.task_submissions_prefix(task_id, agent_id)));
                }
                Ok(json!({ "task_id": task_id }))
            }
            CapabilityKind::CircleJoinRequestWrite => {
                let circle_id = required("circle_id", &request.circle_id)?;
                let circle = self.manifests.require(ManifestKind::Circle, circle_id).await?;
                // Outsiders ask to join; only invite and owner-only circles are closed to them
                if matches!(circle.visibility, Visibility::Invite | Visibility::OwnerOnly) {
                    check_visibility(self.store.as_ref(), keys, &circle, Some(circle_id), agent_id).await?;
                }
                policy
                    .allow_read(keys.circle_join_requests_prefix(circle_id))
                    .allow_write(WriteGrant::Key(keys.circle_join_request(circle_id, agent_id)));
                Ok(json!({ "circle_id": circle_id }))
            }
            CapabilityKind::CircleApprovalWrite => {
                let circle_id = required("circle_id", &request.circle_id)?;
                let target = required("target_agent_id", &request.target_agent_id)?;
                let circle = self.manifests.require(ManifestKind::Circle, circle_id).await?;
                if !circle.is_owner(agent_id) {
                    return Err(AgoraError::Forbidden("only the circle owner approves members".into()));
                }
                if !self.store.exists(&keys.circle_join_request(circle_id, target)).await? {
                    return Err(AgoraError::NotFound(format!("no join request from {}", target)));
                }
                policy
                    .allow_read(keys.circle_prefix(circle_id))
                    .allow_write(WriteGrant::Key(keys.circle_member(circle_id, target)));
                Ok(json!({ "circle_id": circle_id, "target_agent_id": target }))
            }
            CapabilityKind::TopicRead => {
                let topic_id = required("topic_id", &request.topic_id)?;
                self.visible(ManifestKind::Topic, topic_id, agent_id).await?;
                policy.allow_read(keys.topic_prefix(topic_id));
                Ok(json!({ "topic_id": topic_id }))
            }
            CapabilityKind::TopicMessageWrite | CapabilityKind::TopicRequestWrite => {
                let topic_id = required("topic_id", &request.topic_id)?;
                let manifest = self.visible(ManifestKind::Topic, topic_id, agent_id).await?;
                let ctx = self.engine.load(topic_id, &manifest.mode, &manifest.rules).await?;

                let grant = if request.kind == CapabilityKind::TopicMessageWrite {
                    self.engine.authorize_message(&ctx, agent_id, now).await
                } else {
                    let topic_request = request
                        .request
                        .as_ref()
                        .ok_or_else(|| AgoraError::BadRequest("request is required".into()))?;
                    self.engine.authorize_request(&ctx, agent_id, topic_request, now).await
                };
                let grant = grant.map_err(|e| {
                    warn!(topic_id, agent_id, mode = %ctx.mode, reason = %e, "Topic write denied");
                    AgoraError::from(e)
                })?;

                policy.allow_read(keys.topic_prefix(topic_id)).allow_write(grant);
                let mut scope = json!({ "topic_id": topic_id, "mode": ctx.mode.as_str() });
                if let Some(r) = &request.request {
                    scope["request"] = json!(r.type_name());
                }
                Ok(scope)
            }
        }
    }

    /// Mint a credential for `agent_id`
    pub async fn issue(&self, agent_id: &str, request: &CapabilityRequest) -> Result<ScopedCredential> {
        require_safe_id("agent_id", agent_id)?;
        let bucket = self
            .settings
            .bucket
            .as_deref()
            .ok_or_else(|| AgoraError::PreconditionFailed("object store bucket not configured".into()))?;
        let role_name = self
            .settings
            .role_name
            .as_deref()
            .ok_or_else(|| AgoraError::PreconditionFailed("object store role not configured".into()))?;

        let now = Utc::now();
        let mut policy = AccessPolicy::new();
        policy
            .allow_read(self.keys.discovery_prefix())
            .allow_read(self.keys.agent_prefix(agent_id));

        let scope = with_deadline(
            self.deadline,
            "capability_scope",
            self.scope(agent_id, request, &mut policy, now),
        )
        .await?;

        let document = policy.render(bucket)?;
        let policy_json = serde_json::to_string(&document).map_err(|e| AgoraError::Internal(e.to_string()))?;
        let session = session_name(agent_id);
        let credentials = with_deadline(
            self.deadline,
            "assume_role",
            self.sts.assume_role(AssumeRoleRequest {
                role_name,
                session_name: &session,
                policy: &policy_json,
                duration_seconds: self.settings.credential_ttl.as_secs(),
            }),
        )
        .await?;

        let read_prefixes: Vec<String> = policy.read_prefixes.iter().cloned().collect();
        let write_keys = policy.write_keys();

        let record = CapabilityAuditRecord {
            agent_id: agent_id.to_string(),
            kind: request.kind.as_str().to_string(),
            scope,
            read_prefixes: read_prefixes.clone(),
            write_keys: write_keys.clone(),
            expires_at: credentials.expiration,
            issued_at: now,
        };
        if let Err(e) = with_deadline(self.deadline, "capability_audit", self.audit.record(&record)).await {
            warn!(agent_id, kind = %request.kind, error = %e, "Capability audit write failed");
        }

        info!(
            agent_id,
            kind = %request.kind,
            writes = write_keys.len(),
            expires_at = %credentials.expiration,
            "Capability issued"
        );

        Ok(ScopedCredential {
            access_key: credentials.access_key_id,
            secret_key: credentials.access_key_secret,
            session_token: credentials.security_token,
            expiration: credentials.expiration,
            bucket: bucket.to_string(),
            endpoint: self.settings.endpoint.clone(),
            region: self.settings.region.clone(),
            base_prefix: self.keys.base_prefix().to_string(),
            prefixes: read_prefixes,
            write_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::audit::MemoryAuditSink;
    use crate::oss::{put_json, LocalStsClient, MemoryObjectStore};
    use crate::signing::SigningService;
    use async_trait::async_trait;

    struct Harness {
        issuer: CapabilityIssuer,
        manifests: Arc<ManifestStore>,
        store: Arc<MemoryObjectStore>,
        audit: Arc<MemoryAuditSink>,
    }

    fn settings() -> IssuerSettings {
        IssuerSettings {
            bucket: Some("agora-bucket".into()),
            endpoint: "oss.example".into(),
            region: "r1".into(),
            role_name: Some("agent-writer".into()),
            credential_ttl: Duration::from_secs(900),
        }
    }

    fn harness_with(audit_sink: Arc<dyn AuditSink>, settings: IssuerSettings) -> (CapabilityIssuer, Arc<ManifestStore>, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let keys = ObjectKeys::new("");
        let signer = Arc::new(SigningService::ephemeral("agora"));
        let manifests = Arc::new(ManifestStore::new(store.clone(), keys.clone(), signer));
        let issuer = CapabilityIssuer::new(
            store.clone(),
            keys,
            manifests.clone(),
            Arc::new(LocalStsClient),
            audit_sink,
            settings,
            Duration::from_secs(5),
        );
        (issuer, manifests, store)
    }

    fn harness() -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let (issuer, manifests, store) = harness_with(audit.clone(), settings());
        Harness {
            issuer,
            manifests,
            store,
            audit,
        }
    }

    fn request(kind: CapabilityKind) -> CapabilityRequest {
        CapabilityRequest {
            kind,
            circle_id: None,
            task_id: None,
            topic_id: None,
            target_agent_id: None,
            request: None,
        }
    }

    #[tokio::test]
    async fn test_registry_write_scoped_to_agent() {
        let h = harness();
        let cred = h.issuer.issue("a1", &request(CapabilityKind::RegistryWrite)).await.unwrap();
        assert_eq!(cred.write_keys, vec!["registry/agents/a1/"]);
        assert!(cred.prefixes.contains(&"discovery/".to_string()));
        assert!(cred.prefixes.contains(&"agents/a1/".to_string()));
        assert_eq!(h.audit.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_not_found() {
        let h = harness();
        let mut req = request(CapabilityKind::TaskRead);
        req.task_id = Some("nope".into());
        assert!(matches!(h.issuer.issue("a1", &req).await, Err(AgoraError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_bucket_fails_closed() {
        let mut s = settings();
        s.bucket = None;
        let (issuer, _, _) = harness_with(Arc::new(MemoryAuditSink::new()), s);
        assert!(matches!(
            issuer.issue("a1", &request(CapabilityKind::RegistryRead)).await,
            Err(AgoraError::PreconditionFailed(_))
        ));
    }

    struct FailingAudit;

    #[async_trait]
    impl AuditSink for FailingAudit {
        async fn record(&self, _record: &CapabilityAuditRecord) -> Result<()> {
            Err(AgoraError::Database("audit store down".into()))
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block() {
        let (issuer, _, _) = harness_with(Arc::new(FailingAudit), settings());
        assert!(issuer.issue("a1", &request(CapabilityKind::RegistryRead)).await.is_ok());
    }

    #[tokio::test]
    async fn test_circle_approval_by_owner_only() {
        let h = harness();
        h.manifests
            .publish(ManifestKind::Circle, "c1", "owner", json!({ "visibility": "circle" }))
            .await
            .unwrap();
        put_json(h.store.as_ref(), "circles/c1/join_requests/a2.json", &json!({}))
            .await
            .unwrap();

        let mut req = request(CapabilityKind::CircleApprovalWrite);
        req.circle_id = Some("c1".into());
        req.target_agent_id = Some("a2".into());

        assert!(matches!(h.issuer.issue("a3", &req).await, Err(AgoraError::Forbidden(_))));
        let cred = h.issuer.issue("owner", &req).await.unwrap();
        assert_eq!(cred.write_keys, vec!["circles/c1/members/a2.json"]);

        req.target_agent_id = Some("a9".into());
        assert!(matches!(h.issuer.issue("owner", &req).await, Err(AgoraError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_join_request_for_circle_visibility() {
        let h = harness();
        h.manifests
            .publish(ManifestKind::Circle, "c1", "owner", json!({ "visibility": "circle" }))
            .await
            .unwrap();
        let mut req = request(CapabilityKind::CircleJoinRequestWrite);
        req.circle_id = Some("c1".into());
        let cred = h.issuer.issue("outsider", &req).await.unwrap();
        assert_eq!(cred.write_keys, vec!["circles/c1/join_requests/outsider.json"]);
    }

    #[tokio::test]
    async fn test_freeform_topic_prefix() {
        let h = harness();
        h.manifests
            .publish(ManifestKind::Topic, "tp", "owner", json!({ "visibility": "public", "mode": "freeform" }))
            .await
            .unwrap();
        let mut req = request(CapabilityKind::TopicMessageWrite);
        req.topic_id = Some("tp".into());
        let cred = h.issuer.issue("a1", &req).await.unwrap();
        assert_eq!(cred.write_keys, vec!["topics/tp/messages/a1/"]);
        assert!(cred.prefixes.contains(&"topics/tp/".to_string()));
    }

    #[tokio::test]
    async fn test_bad_ids_rejected() {
        let h = harness();
        let mut req = request(CapabilityKind::TopicRead);
        req.topic_id = Some("../secrets".into());
        assert!(matches!(h.issuer.issue("a1", &req).await, Err(AgoraError::BadRequest(_))));
    }

    #[test]
    fn test_session_name_truncated() {
        assert_eq!(session_name("a1"), "agora-a1");
        assert_eq!(session_name(&"x".repeat(64)).len(), MAX_SESSION_NAME);
    }
}
