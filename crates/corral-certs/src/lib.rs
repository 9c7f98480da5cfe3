//! Certificate material for the corral control plane
//!
//! This layer consumes PEM material produced by external provisioning
//! tooling: a trust-anchor certificate plus one leaf certificate (and key)
//! per peer, with the peer's roles embedded as extended-key-usage
//! identifiers. The loaders here accept a combined file holding both the
//! certificate chain and the private key.
//!
//! For development and test fixtures the crate also generates a throwaway
//! CA and role-carrying leaves. Production provisioning stays external.

pub mod generate;
pub mod pem;

pub use generate::{generate_ca, CertAuthority, GeneratedCert};
pub use pem::{load_certs, load_private_key};

use thiserror::Error;

/// Certificate material errors
#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("invalid object identifier: {0}")]
    InvalidOid(String),

    #[error("role has no certificate identifier: {0}")]
    Role(#[from] corral_trust::TrustError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no certificate found in {0}")]
    NoCertificate(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid PEM material: {0}")]
    InvalidPem(String),

    #[error("invalid validity window: {0}")]
    Validity(String),
}
