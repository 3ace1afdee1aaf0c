//! Object store contract and in-memory backend

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::AgoraError;

/// Object store error
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Store unreachable or returned a server error
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    /// Object exists but its body is not what the caller expected
    #[error("Invalid object {key}: {message}")]
    Decode { key: String, message: String },

    /// No object store configured for this deployment
    #[error("Object store not configured")]
    NotConfigured,
}

impl From<ObjectStoreError> for AgoraError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) => AgoraError::NotFound(err.to_string()),
            ObjectStoreError::Unavailable(_) => AgoraError::ObjectStore(err.to_string()),
            ObjectStoreError::Decode { .. } => AgoraError::Internal(err.to_string()),
            ObjectStoreError::NotConfigured => AgoraError::PreconditionFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for ObjectStoreError {
    fn from(err: reqwest::Error) -> Self {
        ObjectStoreError::Unavailable(err.to_string())
    }
}

pub type ObjectResult<T> = std::result::Result<T, ObjectStoreError>;

/// Keyed object storage (get/put/list/exists)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> ObjectResult<Bytes>;

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()>;

    async fn exists(&self, key: &str) -> ObjectResult<bool>;

    /// Keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> ObjectResult<Vec<String>>;
}

/// Fetch and decode a JSON object; a missing object is `Ok(None)`
pub async fn get_json<T: DeserializeOwned>(store: &dyn ObjectStore, key: &str) -> ObjectResult<Option<T>> {
    match store.get(key).await {
        Ok(body) => serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ObjectStoreError::Decode {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(ObjectStoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn put_json<T: Serialize + ?Sized>(store: &dyn ObjectStore, key: &str, value: &T) -> ObjectResult<()> {
    let body = serde_json::to_vec(value).map_err(|e| ObjectStoreError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.put(key, Bytes::from(body), "application/json").await
}

/// In-memory object store for dev mode and tests
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Bytes>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> ObjectResult<Bytes> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> ObjectResult<()> {
        self.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> ObjectResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Placeholder used when no object store is configured; every call fails closed
pub struct UnconfiguredObjectStore;

#[async_trait]
impl ObjectStore for UnconfiguredObjectStore {
    async fn get(&self, _key: &str) -> ObjectResult<Bytes> {
        Err(ObjectStoreError::NotConfigured)
    }

    async fn put(&self, _key: &str, _body: Bytes, _content_type: &str) -> ObjectResult<()> {
        Err(ObjectStoreError::NotConfigured)
    }

    async fn exists(&self, _key: &str) -> ObjectResult<bool> {
        Err(ObjectStoreError::NotConfigured)
    }

    async fn list(&self, _prefix: &str) -> ObjectResult<Vec<String>> {
        Err(ObjectStoreError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_object_is_typed() {
        let store = MemoryObjectStore::new();
        assert!(matches!(store.get("nope").await, Err(ObjectStoreError::NotFound(_))));
        let missing: Option<serde_json::Value> = get_json(&store, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_json_round_trip_and_list() {
        let store = MemoryObjectStore::new();
        put_json(&store, "topics/t1/state.json", &json!({ "turn_id": "t3" }))
            .await
            .unwrap();
        put_json(&store, "topics/t2/state.json", &json!({})).await.unwrap();

        let state: serde_json::Value = get_json(&store, "topics/t1/state.json").await.unwrap().unwrap();
        assert_eq!(state["turn_id"], "t3");
        assert_eq!(store.list("topics/t1/").await.unwrap(), vec!["topics/t1/state.json"]);
        assert!(store.exists("topics/t2/state.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let store = MemoryObjectStore::new();
        store.put("bad.json", Bytes::from_static(b"{oops"), "application/json").await.unwrap();
        let result: ObjectResult<Option<serde_json::Value>> = get_json(&store, "bad.json").await;
        assert!(matches!(result, Err(ObjectStoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_unconfigured_fails_closed() {
        let err = AgoraError::from(UnconfiguredObjectStore.exists("k").await.unwrap_err());
        assert!(matches!(err, AgoraError::PreconditionFailed(_)));
    }
}
