//! Manifest signing
//!
//! - `canonical`: canonical JSON bytes
//! - `keyring`: active and retired Ed25519 keys
//! - `service`: certificate minting, verification, rotation and JWKS
//! - `writer`: sign-then-put for object-store manifests

pub mod canonical;
pub mod keyring;
pub mod service;
pub mod writer;

pub use keyring::{KeyRing, KeyStatus};
pub use service::{Cert, Jwk, Jwks, SigningService};
pub use writer::SignedObjectWriter;

use crate::types::AgoraError;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("no active signing key configured")]
    NoActiveKey,

    #[error("object carries no certificate")]
    MissingCert,

    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlg(String),

    #[error("signature does not match")]
    BadSignature,

    #[error("certificate expired")]
    Expired,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<SigningError> for AgoraError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::NoActiveKey => AgoraError::PreconditionFailed(err.to_string()),
            SigningError::InvalidKey(_) => AgoraError::Config(err.to_string()),
            SigningError::Encoding(_) => AgoraError::BadRequest(err.to_string()),
            SigningError::MissingCert
            | SigningError::UnknownKey(_)
            | SigningError::UnsupportedAlg(_)
            | SigningError::BadSignature
            | SigningError::Expired => AgoraError::Forbidden(format!("manifest verification failed: {}", err)),
        }
    }
}
