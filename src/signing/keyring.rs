//! Ed25519 key ring
//!
//! One active key signs; retired and revoked keys stay in the ring so
//! certificates they issued remain verifiable by `key_id`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::SigningError;

pub const ALG_ED25519: &str = "Ed25519";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Revoked,
}

pub struct KeyEntry {
    pub key_id: String,
    pub verifying_key: VerifyingKey,
    /// Present only for keys this process may sign with
    signing_key: Option<SigningKey>,
    pub status: KeyStatus,
    pub added_at: DateTime<Utc>,
}

impl KeyEntry {
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }
}

/// Key id derived from the public key: first 16 hex chars of its SHA-256
pub fn derive_key_id(verifying_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(verifying_key.as_bytes());
    hex::encode(&digest[..8])
}

/// Decode a base64 (standard or url-safe) 32-byte value
fn decode_32(input: &str, what: &str) -> Result<[u8; 32], SigningError> {
    let input = input.trim();
    let mut bytes = STANDARD
        .decode(input)
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .map_err(|e| SigningError::InvalidKey(format!("{} is not base64: {}", what, e)))?;

    if bytes.len() != 32 {
        let len = bytes.len();
        bytes.zeroize();
        return Err(SigningError::InvalidKey(format!("{} must be 32 bytes, got {}", what, len)));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

pub fn signing_key_from_base64(seed: &str) -> Result<SigningKey, SigningError> {
    let mut bytes = decode_32(seed, "signing key")?;
    let key = SigningKey::from_bytes(&bytes);
    bytes.zeroize();
    Ok(key)
}

pub fn verifying_key_from_base64(public: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = decode_32(public, "public key")?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

#[derive(Default)]
pub struct KeyRing {
    keys: Vec<KeyEntry>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `key` the active signing key. Any previously active key is revoked.
    pub fn activate(&mut self, key: SigningKey, key_id: Option<String>) -> Result<String, SigningError> {
        let verifying_key = key.verifying_key();
        let key_id = key_id.unwrap_or_else(|| derive_key_id(&verifying_key));
        if self.get(&key_id).is_some() {
            return Err(SigningError::InvalidKey(format!("key id {} already in ring", key_id)));
        }

        for entry in self.keys.iter_mut().filter(|e| e.status == KeyStatus::Active) {
            entry.status = KeyStatus::Revoked;
            // Retired keys only verify from here on
            entry.signing_key = None;
        }

        self.keys.push(KeyEntry {
            key_id: key_id.clone(),
            verifying_key,
            signing_key: Some(key),
            status: KeyStatus::Active,
            added_at: Utc::now(),
        });
        Ok(key_id)
    }

    /// Add a public key kept only for verifying older certificates
    pub fn add_retired(&mut self, key_id: String, verifying_key: VerifyingKey) -> Result<(), SigningError> {
        if self.get(&key_id).is_some() {
            return Err(SigningError::InvalidKey(format!("key id {} already in ring", key_id)));
        }
        self.keys.push(KeyEntry {
            key_id,
            verifying_key,
            signing_key: None,
            status: KeyStatus::Revoked,
            added_at: Utc::now(),
        });
        Ok(())
    }

    /// Stop signing with `key_id`; it stays available for verification
    pub fn revoke(&mut self, key_id: &str) -> Result<(), SigningError> {
        let entry = self
            .keys
            .iter_mut()
            .find(|e| e.key_id == key_id)
            .ok_or_else(|| SigningError::UnknownKey(key_id.to_string()))?;
        entry.status = KeyStatus::Revoked;
        entry.signing_key = None;
        Ok(())
    }

    pub fn active(&self) -> Option<&KeyEntry> {
        self.keys
            .iter()
            .find(|e| e.status == KeyStatus::Active && e.signing_key.is_some())
    }

    pub fn get(&self, key_id: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|e| e.key_id == key_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &KeyEntry> {
        self.keys.iter()
    }
}

/// Public key as a JWK `x` value
pub fn public_key_b64url(verifying_key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(verifying_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_revokes_previous() {
        let mut ring = KeyRing::new();
        let first = ring.activate(generate_signing_key(), None).unwrap();
        let second = ring.activate(generate_signing_key(), Some("k2".into())).unwrap();

        assert_eq!(second, "k2");
        assert_eq!(ring.active().unwrap().key_id, "k2");
        let old = ring.get(&first).unwrap();
        assert_eq!(old.status, KeyStatus::Revoked);
        assert!(old.signing_key().is_none());
    }

    #[test]
    fn test_revoke_active_leaves_no_signer() {
        let mut ring = KeyRing::new();
        let kid = ring.activate(generate_signing_key(), None).unwrap();
        ring.revoke(&kid).unwrap();
        assert!(ring.active().is_none());
        assert!(ring.get(&kid).is_some());
        assert!(matches!(ring.revoke("nope"), Err(SigningError::UnknownKey(_))));
    }

    #[test]
    fn test_key_parsing() {
        let key = generate_signing_key();
        let seed = STANDARD.encode(key.to_bytes());
        let parsed = signing_key_from_base64(&seed).unwrap();
        assert_eq!(parsed.verifying_key(), key.verifying_key());

        let public = public_key_b64url(&key.verifying_key());
        assert_eq!(verifying_key_from_base64(&public).unwrap(), key.verifying_key());

        assert!(signing_key_from_base64("c2hvcnQ=").is_err());
        assert_eq!(derive_key_id(&key.verifying_key()).len(), 16);
    }
}
