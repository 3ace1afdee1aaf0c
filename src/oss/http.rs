//! HTTP client for the object store gateway
//!
//! `GET/PUT/HEAD {base}/objects/{key}` and `GET {base}/objects?prefix=`.
//! A 404 maps to [`ObjectStoreError::NotFound`]; nothing inspects error text.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::store::{ObjectResult, ObjectStore, ObjectStoreError};

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    keys: Vec<String>,
}

pub struct HttpObjectStore {
    base_url: String,
    client: Client,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, timeout: Duration) -> ObjectResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ObjectStoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.base_url, urlencoding::encode(key))
    }

    async fn server_error(key: &str, response: reqwest::Response) -> ObjectStoreError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ObjectStoreError::NotFound(key.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        ObjectStoreError::Unavailable(format!("{} returned {}: {}", key, status.as_u16(), body))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str) -> ObjectResult<Bytes> {
        let response = self.client.get(self.object_url(key)).send().await?;
        if !response.status().is_success() {
            return Err(Self::server_error(key, response).await);
        }
        Ok(response.bytes().await?)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::server_error(key, response).await);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectResult<bool> {
        let response = self.client.head(self.object_url(key)).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::server_error(key, response).await),
        }
    }

    async fn list(&self, prefix: &str) -> ObjectResult<Vec<String>> {
        let url = format!("{}/objects?prefix={}", self.base_url, urlencoding::encode(prefix));
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::server_error(prefix, response).await);
        }
        let mut list: ListResponse = response.json().await?;
        list.keys.sort();
        Ok(list.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_key() {
        let store = HttpObjectStore::new("http://oss.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.object_url("topics/t1/state.json"),
            "http://oss.local/objects/topics%2Ft1%2Fstate.json"
        );
    }
}
