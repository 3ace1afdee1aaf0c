//! Signed resource manifests (circles, tasks, topics)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::coordination::{ModeRules, TopicMode};
use crate::oss::keys::is_safe_segment;
use crate::oss::{get_json, ObjectKeys, ObjectStore};
use crate::signing::{Cert, SignedObjectWriter, SigningService};
use crate::types::{AgoraError, Result};

/// Who may see a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Circle,
    Invite,
    #[serde(alias = "owner-only", alias = "owner")]
    OwnerOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Circle,
    Task,
    Topic,
}

impl ManifestKind {
    /// From the `{circles|tasks|topics}` path segment
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "circles" => Some(Self::Circle),
            "tasks" => Some(Self::Task),
            "topics" => Some(Self::Topic),
            _ => None,
        }
    }

    pub fn key(&self, keys: &ObjectKeys, id: &str) -> String {
        match self {
            Self::Circle => keys.circle_manifest(id),
            Self::Task => keys.task_manifest(id),
            Self::Topic => keys.topic_manifest(id),
        }
    }

    fn id_field(&self) -> &'static str {
        match self {
            Self::Circle => "circle_id",
            Self::Task => "task_id",
            Self::Topic => "topic_id",
        }
    }
}

fn default_mode() -> String {
    TopicMode::Freeform.as_str().to_string()
}

/// The fields the platform interprets; everything else is carried through
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    pub visibility: Visibility,
    #[serde(default)]
    pub owner_agent_id: Option<String>,
    /// Circle whose members may see a `circle`-visibility task or topic
    #[serde(default)]
    pub circle_id: Option<String>,
    #[serde(default, alias = "invite_list")]
    pub allow_list: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub rules: Value,
    #[serde(default)]
    pub cert: Option<Cert>,
}

impl Manifest {
    pub fn is_owner(&self, agent_id: &str) -> bool {
        self.owner_agent_id.as_deref() == Some(agent_id)
    }
}

pub fn require_safe_id(field: &str, id: &str) -> Result<()> {
    if !is_safe_segment(id) {
        return Err(AgoraError::BadRequest(format!("invalid {}: '{}'", field, id)));
    }
    Ok(())
}

/// Loads, verifies and publishes manifests
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeys,
    signer: Arc<SigningService>,
    writer: SignedObjectWriter,
    require_signed: bool,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn ObjectStore>, keys: ObjectKeys, signer: Arc<SigningService>) -> Self {
        Self {
            writer: SignedObjectWriter::new(signer.clone(), store.clone()),
            store,
            keys,
            signer,
            require_signed: false,
        }
    }

    /// Refuse manifests that carry no certificate
    pub fn with_require_signed(mut self, require_signed: bool) -> Self {
        self.require_signed = require_signed;
        self
    }

    /// Object key a manifest lives at
    pub fn key(&self, kind: ManifestKind, id: &str) -> String {
        kind.key(&self.keys, id)
    }

    /// Load a manifest; a missing object is `Ok(None)`.
    ///
    /// A certificate, when present, must verify against the key ring and be
    /// unexpired.
    pub async fn load(&self, kind: ManifestKind, id: &str) -> Result<Option<Manifest>> {
        self.fetch(kind, id, true).await
    }

    async fn fetch(&self, kind: ManifestKind, id: &str, enforce_expiry: bool) -> Result<Option<Manifest>> {
        let key = kind.key(&self.keys, id);
        let Some(raw) = get_json::<Value>(self.store.as_ref(), &key).await? else {
            return Ok(None);
        };

        if raw.get("cert").is_some_and(|c| !c.is_null()) {
            let verified = if enforce_expiry {
                self.signer.verify(&raw).await
            } else {
                self.signer.verify_authentic(&raw).await
            };
            if let Err(e) = verified {
                warn!(key, error = %e, "Manifest certificate rejected");
                return Err(AgoraError::Forbidden(format!("manifest {} failed verification: {}", key, e)));
            }
        } else if self.require_signed {
            warn!(key, "Unsigned manifest refused");
            return Err(AgoraError::Forbidden(format!("manifest {} is not signed", key)));
        } else {
            warn!(key, "Unsigned manifest accepted");
        }

        let manifest = serde_json::from_value(raw)
            .map_err(|e| AgoraError::Internal(format!("malformed manifest {}: {}", key, e)))?;
        Ok(Some(manifest))
    }

    /// Load a manifest that must exist
    pub async fn require(&self, kind: ManifestKind, id: &str) -> Result<Manifest> {
        self.load(kind, id)
            .await?
            .ok_or_else(|| AgoraError::NotFound(format!("manifest not found: {}", kind.key(&self.keys, id))))
    }

    /// Publish `body` as the manifest of `id`, owned by `agent_id`
    pub async fn publish(&self, kind: ManifestKind, id: &str, agent_id: &str, body: Value) -> Result<(Value, Cert)> {
        require_safe_id(kind.id_field(), id)?;
        let Value::Object(mut fields) = body else {
            return Err(AgoraError::BadRequest("manifest must be a JSON object".into()));
        };

        // Republishing renews an expired certificate, so only authenticity
        // matters for the ownership check
        if let Some(existing) = self.fetch(kind, id, false).await? {
            if !existing.is_owner(agent_id) {
                return Err(AgoraError::Forbidden("only the owner may republish a manifest".into()));
            }
        }

        fields.remove("cert");
        fields.insert("owner_agent_id".into(), Value::String(agent_id.to_string()));
        fields.insert(kind.id_field().into(), Value::String(id.to_string()));
        let object = Value::Object(fields);

        let manifest: Manifest = serde_json::from_value(object.clone())
            .map_err(|e| AgoraError::BadRequest(format!("invalid manifest: {}", e)))?;
        if manifest.visibility == Visibility::Circle && kind != ManifestKind::Circle {
            let circle_id = manifest
                .circle_id
                .as_deref()
                .ok_or_else(|| AgoraError::BadRequest("circle visibility needs circle_id".into()))?;
            require_safe_id("circle_id", circle_id)?;
        }
        if kind == ManifestKind::Topic {
            let mode: TopicMode = manifest.mode.parse().map_err(AgoraError::from)?;
            ModeRules::parse(mode, &manifest.rules).map_err(|e| AgoraError::BadRequest(e.to_string()))?;
        }

        let key = kind.key(&self.keys, id);
        let (stored, cert) = self.writer.put_signed(&key, object).await?;
        info!(key, agent_id, key_id = %cert.key_id, "Manifest published");
        Ok((stored, cert))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oss::{put_json, MemoryObjectStore};
    use crate::signing::keyring::generate_signing_key;
    use crate::signing::KeyRing;
    use ed25519_dalek::SigningKey;
    use serde_json::json;

    fn signer_with(key: &SigningKey, ttl: chrono::Duration) -> Arc<SigningService> {
        let mut ring = KeyRing::new();
        ring.activate(key.clone(), None).unwrap();
        Arc::new(SigningService::new("agora", ttl, ring))
    }

    fn manifests() -> (ManifestStore, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let signer = Arc::new(SigningService::ephemeral("agora"));
        (ManifestStore::new(store.clone(), ObjectKeys::new(""), signer), store)
    }

    #[tokio::test]
    async fn test_publish_stamps_owner_and_signs() {
        let (manifests, _) = manifests();
        let (stored, _) = manifests
            .publish(ManifestKind::Task, "t1", "a1", json!({ "visibility": "public", "owner_agent_id": "mallory" }))
            .await
            .unwrap();
        assert_eq!(stored["owner_agent_id"], "a1");
        assert_eq!(stored["task_id"], "t1");

        let loaded = manifests.require(ManifestKind::Task, "t1").await.unwrap();
        assert!(loaded.is_owner("a1"));
        assert!(loaded.cert.is_some());
    }

    #[tokio::test]
    async fn test_republish_requires_owner() {
        let (manifests, _) = manifests();
        manifests
            .publish(ManifestKind::Circle, "c1", "a1", json!({ "visibility": "circle" }))
            .await
            .unwrap();
        assert!(matches!(
            manifests
                .publish(ManifestKind::Circle, "c1", "a2", json!({ "visibility": "public" }))
                .await,
            Err(AgoraError::Forbidden(_))
        ));
        assert!(manifests
            .publish(ManifestKind::Circle, "c1", "a1", json!({ "visibility": "public" }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_topic_rules_validated_on_publish() {
        let (manifests, _) = manifests();
        let bad = json!({ "visibility": "public", "mode": "limited_slots", "rules": {} });
        assert!(matches!(
            manifests.publish(ManifestKind::Topic, "tp", "a1", bad).await,
            Err(AgoraError::BadRequest(_))
        ));
        let unknown = json!({ "visibility": "public", "mode": "karaoke" });
        assert!(matches!(
            manifests.publish(ManifestKind::Topic, "tp", "a1", unknown).await,
            Err(AgoraError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_manifest_is_forbidden() {
        let (manifests, store) = manifests();
        let (mut stored, _) = manifests
            .publish(ManifestKind::Task, "t1", "a1", json!({ "visibility": "invite", "allow_list": ["a2"] }))
            .await
            .unwrap();
        stored["allow_list"] = json!(["a2", "mallory"]);
        put_json(store.as_ref(), "tasks/t1/manifest.json", &stored).await.unwrap();

        assert!(matches!(
            manifests.load(ManifestKind::Task, "t1").await,
            Err(AgoraError::Forbidden(_))
        ));
    }

    async fn strip_cert_and_reassign(store: &MemoryObjectStore) {
        let key = "circles/c1/manifest.json";
        let mut stored: Value = get_json(store, key).await.unwrap().unwrap();
        stored.as_object_mut().unwrap().remove("cert");
        stored["owner_agent_id"] = json!("mallory");
        put_json(store, key, &stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsigned_manifest_refused_when_required() {
        let store = Arc::new(MemoryObjectStore::new());
        let signer = Arc::new(SigningService::ephemeral("agora"));
        let strict = ManifestStore::new(store.clone(), ObjectKeys::new(""), signer.clone()).with_require_signed(true);
        strict
            .publish(ManifestKind::Circle, "c1", "a1", json!({ "visibility": "circle" }))
            .await
            .unwrap();
        strip_cert_and_reassign(&store).await;

        assert!(matches!(
            strict.load(ManifestKind::Circle, "c1").await,
            Err(AgoraError::Forbidden(_))
        ));
        assert!(matches!(
            strict
                .publish(ManifestKind::Circle, "c1", "mallory", json!({ "visibility": "public" }))
                .await,
            Err(AgoraError::Forbidden(_))
        ));

        // Legacy acceptance stays the default
        let lenient = ManifestStore::new(store, ObjectKeys::new(""), signer);
        let loaded = lenient.require(ManifestKind::Circle, "c1").await.unwrap();
        assert!(loaded.cert.is_none());
    }

    #[tokio::test]
    async fn test_expired_manifest_renewed_by_owner_republish() {
        let store = Arc::new(MemoryObjectStore::new());
        let key = generate_signing_key();
        let lapsed = ManifestStore::new(
            store.clone(),
            ObjectKeys::new(""),
            signer_with(&key, chrono::Duration::seconds(-60)),
        );
        lapsed
            .publish(ManifestKind::Task, "t1", "a1", json!({ "visibility": "public" }))
            .await
            .unwrap();

        let manifests = ManifestStore::new(store, ObjectKeys::new(""), signer_with(&key, chrono::Duration::days(30)));
        assert!(matches!(
            manifests.load(ManifestKind::Task, "t1").await,
            Err(AgoraError::Forbidden(_))
        ));

        assert!(matches!(
            manifests
                .publish(ManifestKind::Task, "t1", "a2", json!({ "visibility": "public" }))
                .await,
            Err(AgoraError::Forbidden(_))
        ));
        manifests
            .publish(ManifestKind::Task, "t1", "a1", json!({ "visibility": "public" }))
            .await
            .unwrap();
        assert!(manifests.require(ManifestKind::Task, "t1").await.unwrap().is_owner("a1"));
    }

    #[test]
    fn test_visibility_aliases() {
        let v: Visibility = serde_json::from_str("\"owner-only\"").unwrap();
        assert_eq!(v, Visibility::OwnerOnly);
        assert_eq!(ManifestKind::from_segment("topics"), Some(ManifestKind::Topic));
        assert_eq!(ManifestKind::from_segment("users"), None);
    }
}
