//! Role and trust model for the corral control plane
//!
//! Every peer on the control plane asserts one or more roles at handshake
//! time. A role is backed by a well-known object identifier embedded in the
//! extended-key-usage field of the peer's certificate, so the asserted role
//! can be checked locally against the TLS-validated leaf certificate.

pub mod role;
pub mod verify;

pub use role::{oid_for_role, role_for_oid, Role};
pub use verify::{certificate_roles, verify_role};

use thiserror::Error;

/// Trust errors
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("no identifier mapped for role {0}")]
    UnknownRole(Role),

    #[error("no peer certificate presented")]
    NoCertificate,

    #[error("certificate parse error: {0}")]
    CertificateParse(String),
}
