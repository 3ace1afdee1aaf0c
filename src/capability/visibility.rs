//! Manifest visibility checks

use tracing::warn;

use crate::oss::{ObjectKeys, ObjectStore};
use crate::types::{AgoraError, Result};

use super::manifest::{Manifest, Visibility};

/// Allow or deny `agent_id` access to a resource.
///
/// `own_circle_id` is the resource's own id when the manifest is a circle,
/// so a circle-visibility circle checks membership of itself. The owner is
/// always admitted.
pub async fn check_visibility(
    store: &dyn ObjectStore,
    keys: &ObjectKeys,
    manifest: &Manifest,
    own_circle_id: Option<&str>,
    agent_id: &str,
) -> Result<()> {
    if manifest.is_owner(agent_id) {
        return Ok(());
    }

    let allowed = match manifest.visibility {
        Visibility::Public => true,
        Visibility::OwnerOnly => false,
        Visibility::Invite => manifest.allow_list.iter().any(|a| a == agent_id),
        Visibility::Circle => {
            let circle_id = own_circle_id.or(manifest.circle_id.as_deref()).ok_or_else(|| {
                AgoraError::Forbidden("circle visibility without a circle".into())
            })?;
            store.exists(&keys.circle_member(circle_id, agent_id)).await?
        }
    };

    if !allowed {
        warn!(agent_id, visibility = ?manifest.visibility, "Visibility denied");
        return Err(AgoraError::Forbidden(format!(
            "{:?} resource is not visible to {}",
            manifest.visibility, agent_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oss::{put_json, MemoryObjectStore};
    use serde_json::{json, Value};

    fn manifest(raw: Value) -> Manifest {
        serde_json::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn test_each_visibility() {
        let store = MemoryObjectStore::new();
        let keys = ObjectKeys::new("");

        let public = manifest(json!({ "visibility": "public" }));
        assert!(check_visibility(&store, &keys, &public, None, "anyone").await.is_ok());

        let owner_only = manifest(json!({ "visibility": "owner_only", "owner_agent_id": "a1" }));
        assert!(check_visibility(&store, &keys, &owner_only, None, "a1").await.is_ok());
        assert!(check_visibility(&store, &keys, &owner_only, None, "a2").await.is_err());

        let invite = manifest(json!({ "visibility": "invite", "allow_list": ["a2"] }));
        assert!(check_visibility(&store, &keys, &invite, None, "a2").await.is_ok());
        assert!(matches!(
            check_visibility(&store, &keys, &invite, None, "a3").await,
            Err(AgoraError::Forbidden(_))
        ));

        let circle = manifest(json!({ "visibility": "circle", "circle_id": "c1" }));
        assert!(check_visibility(&store, &keys, &circle, None, "a4").await.is_err());
        put_json(&store, &keys.circle_member("c1", "a4"), &json!({})).await.unwrap();
        assert!(check_visibility(&store, &keys, &circle, None, "a4").await.is_ok());
    }
}
