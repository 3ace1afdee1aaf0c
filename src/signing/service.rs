//! Signing Service
//!
//! Mints and verifies certificates over canonical JSON. The signed message
//! is the object's canonical bytes (without `cert`) followed by a newline
//! and the canonical bytes of the certificate header, so the issuer, key
//! id and validity window are covered by the signature too.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::canonical::{canonical_bytes, CERT_FIELD};
use super::keyring::{
    generate_signing_key, public_key_b64url, signing_key_from_base64, verifying_key_from_base64, KeyRing, KeyStatus,
    ALG_ED25519,
};
use super::SigningError;
use crate::config::Args;
use crate::types::AgoraError;

/// Certificate attached to a signed object under `cert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cert {
    pub issuer: String,
    pub key_id: String,
    pub alg: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// base64url (no padding) Ed25519 signature
    pub signature: String,
}

#[derive(Serialize)]
struct CertHeader<'a> {
    issuer: &'a str,
    key_id: &'a str,
    alg: &'a str,
    issued_at: &'a DateTime<Utc>,
    expires_at: &'a DateTime<Utc>,
}

impl Cert {
    fn header(&self) -> CertHeader<'_> {
        CertHeader {
            issuer: &self.issuer,
            key_id: &self.key_id,
            alg: &self.alg,
            issued_at: &self.issued_at,
            expires_at: &self.expires_at,
        }
    }
}

fn signing_message(object: &Value, header: &CertHeader<'_>) -> Result<Vec<u8>, SigningError> {
    let header = serde_json::to_value(header).map_err(|e| SigningError::Encoding(e.to_string()))?;
    let mut message = canonical_bytes(object);
    message.push(b'\n');
    message.extend_from_slice(&canonical_bytes(&header));
    Ok(message)
}

fn embedded_cert(object: &Value) -> Result<Cert, SigningError> {
    let raw = object.get(CERT_FIELD).ok_or(SigningError::MissingCert)?;
    serde_json::from_value(raw.clone()).map_err(|e| SigningError::Encoding(format!("malformed cert: {}", e)))
}

/// JWK entry for `/.well-known/agora-keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub x: String,
    pub status: KeyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

pub struct SigningService {
    issuer: String,
    cert_ttl: Duration,
    ring: RwLock<KeyRing>,
}

impl SigningService {
    /// Service over an existing ring (which may have no active key)
    pub fn new(issuer: impl Into<String>, cert_ttl: Duration, ring: KeyRing) -> Self {
        Self {
            issuer: issuer.into(),
            cert_ttl,
            ring: RwLock::new(ring),
        }
    }

    /// Service with a freshly generated key, for dev mode and tests
    pub fn ephemeral(issuer: impl Into<String>) -> Self {
        let mut ring = KeyRing::new();
        // A fresh ring cannot already hold the generated key id
        let _ = ring.activate(generate_signing_key(), None);
        Self::new(issuer, Duration::days(365), ring)
    }

    /// Service from `SIGNING_*` settings.
    ///
    /// Retired keys are loaded first; in dev mode a missing `SIGNING_KEY`
    /// becomes a generated key in the same ring.
    pub fn from_args(args: &Args) -> crate::types::Result<Self> {
        let cert_ttl = Duration::try_days(args.signing.cert_ttl_days)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| AgoraError::Config(format!("invalid CERT_TTL_DAYS: {}", args.signing.cert_ttl_days)))?;

        let mut ring = KeyRing::new();
        for (key_id, public) in args.retired_key_list() {
            ring.add_retired(key_id.clone(), verifying_key_from_base64(&public)?)?;
            info!(key_id, "Retired signing key loaded");
        }

        match &args.signing.signing_key {
            Some(seed) => {
                let key_id = ring.activate(signing_key_from_base64(seed)?, args.signing.signing_key_id.clone())?;
                info!(key_id, "Signing key active");
            }
            None if args.dev_mode => {
                let key_id = ring.activate(generate_signing_key(), None)?;
                warn!(key_id, "SIGNING_KEY not set (dev mode, using an ephemeral signing key)");
            }
            None => warn!("SIGNING_KEY not set - manifest publishing will fail"),
        }

        Ok(Self::new(args.signing.issuer.clone(), cert_ttl, ring))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub async fn has_active_key(&self) -> bool {
        self.ring.read().await.active().is_some()
    }

    pub async fn active_key_id(&self) -> Option<String> {
        self.ring.read().await.active().map(|k| k.key_id.clone())
    }

    /// Produce a certificate over `object` (its `cert` field is ignored)
    pub async fn sign(&self, object: &Value) -> Result<Cert, SigningError> {
        let ring = self.ring.read().await;
        let entry = ring.active().ok_or(SigningError::NoActiveKey)?;
        let key: &SigningKey = entry.signing_key().ok_or(SigningError::NoActiveKey)?;

        let issued_at = Utc::now();
        let mut cert = Cert {
            issuer: self.issuer.clone(),
            key_id: entry.key_id.clone(),
            alg: ALG_ED25519.to_string(),
            issued_at,
            expires_at: issued_at + self.cert_ttl,
            signature: String::new(),
        };
        let message = signing_message(object, &cert.header())?;
        cert.signature = URL_SAFE_NO_PAD.encode(key.sign(&message).to_bytes());
        Ok(cert)
    }

    /// Sign `object` in place, replacing any existing `cert`
    pub async fn attach(&self, object: &mut Value) -> Result<Cert, SigningError> {
        let Value::Object(map) = object else {
            return Err(SigningError::Encoding("only JSON objects can be signed".into()));
        };
        map.remove(CERT_FIELD);
        let cert = self.sign(object).await?;
        let encoded = serde_json::to_value(&cert).map_err(|e| SigningError::Encoding(e.to_string()))?;
        if let Value::Object(map) = object {
            map.insert(CERT_FIELD.to_string(), encoded);
        }
        Ok(cert)
    }

    /// Verify the certificate embedded in `object` against the key it names
    pub async fn verify(&self, object: &Value) -> Result<Cert, SigningError> {
        let cert = embedded_cert(object)?;
        self.verify_cert(object, &cert).await?;
        Ok(cert)
    }

    /// Like [`verify`](Self::verify), but a certificate past `expires_at`
    /// still passes when its signature checks out
    pub async fn verify_authentic(&self, object: &Value) -> Result<Cert, SigningError> {
        let cert = embedded_cert(object)?;
        self.verify_signature(object, &cert).await?;
        Ok(cert)
    }

    /// Verify `cert` over `object`
    pub async fn verify_cert(&self, object: &Value, cert: &Cert) -> Result<(), SigningError> {
        self.verify_signature(object, cert).await?;
        if cert.expires_at <= Utc::now() {
            return Err(SigningError::Expired);
        }
        Ok(())
    }

    async fn verify_signature(&self, object: &Value, cert: &Cert) -> Result<(), SigningError> {
        if cert.alg != ALG_ED25519 {
            return Err(SigningError::UnsupportedAlg(cert.alg.clone()));
        }
        if cert.issuer != self.issuer {
            return Err(SigningError::BadSignature);
        }

        let ring = self.ring.read().await;
        let entry = ring
            .get(&cert.key_id)
            .ok_or_else(|| SigningError::UnknownKey(cert.key_id.clone()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(&cert.signature)
            .map_err(|_| SigningError::BadSignature)?;
        let signature = Signature::from_slice(&bytes).map_err(|_| SigningError::BadSignature)?;
        let message = signing_message(object, &cert.header())?;
        entry
            .verifying_key
            .verify(&message, &signature)
            .map_err(|_| SigningError::BadSignature)
    }

    /// Activate a new key; the previous active key is retained as revoked
    pub async fn rotate(&self, key: Option<SigningKey>, key_id: Option<String>) -> Result<String, SigningError> {
        let key = key.unwrap_or_else(generate_signing_key);
        let mut ring = self.ring.write().await;
        let previous = ring.active().map(|k| k.key_id.clone());
        let key_id = ring.activate(key, key_id)?;
        info!(key_id = %key_id, previous = ?previous, "Signing key rotated");
        Ok(key_id)
    }

    /// Stop signing with `key_id`
    pub async fn revoke(&self, key_id: &str) -> Result<(), SigningError> {
        let mut ring = self.ring.write().await;
        ring.revoke(key_id)?;
        if ring.active().is_none() {
            warn!(key_id, "Active signing key revoked; signing disabled until rotation");
        } else {
            info!(key_id, "Signing key revoked");
        }
        Ok(())
    }

    /// Every key in the ring as a JWK set
    pub async fn jwks(&self) -> Jwks {
        let ring = self.ring.read().await;
        Jwks {
            keys: ring
                .entries()
                .map(|entry| Jwk {
                    kty: "OKP".to_string(),
                    crv: ALG_ED25519.to_string(),
                    key_use: "sig".to_string(),
                    kid: entry.key_id.clone(),
                    x: public_key_b64url(&entry.verifying_key),
                    status: entry.status,
                })
                .collect(),
        }
    }
}
