//! Sign-then-put for manifests

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::oss::{put_json, ObjectStore};
use crate::types::Result;

use super::service::{Cert, SigningService};

/// Writes objects to the store with a fresh certificate attached
pub struct SignedObjectWriter {
    signer: Arc<SigningService>,
    store: Arc<dyn ObjectStore>,
}

impl SignedObjectWriter {
    pub fn new(signer: Arc<SigningService>, store: Arc<dyn ObjectStore>) -> Self {
        Self { signer, store }
    }

    /// Attach a certificate to `object` and store it at `key`.
    ///
    /// Fails with a precondition error when no signing key is active;
    /// nothing is written unsigned.
    pub async fn put_signed(&self, key: &str, mut object: Value) -> Result<(Value, Cert)> {
        let cert = self.signer.attach(&mut object).await?;
        put_json(self.store.as_ref(), key, &object).await?;
        info!(key, key_id = %cert.key_id, "Signed object written");
        Ok((object, cert))
    }
}
