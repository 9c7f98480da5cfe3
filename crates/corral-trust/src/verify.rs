//! Local certificate role verification
//!
//! The TLS layer has already validated the peer chain against the configured
//! trust anchor by the time these checks run; this module only inspects the
//! leaf certificate's extended-key-usage identifiers. No network calls.

use crate::role::role_for_oid;
use crate::{Role, TrustError};
use rustls::pki_types::CertificateDer;
use tracing::debug;

/// Collect the roles embedded in a certificate's extended-key-usage field
///
/// Standard key-usage purposes (serverAuth, clientAuth, ...) are ignored;
/// only the corral role identifiers contribute bits. A certificate without
/// any recognized identifier yields [`Role::UNKNOWN`].
pub fn certificate_roles(cert: &CertificateDer<'_>) -> Result<Role, TrustError> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
        .map_err(|e| TrustError::CertificateParse(e.to_string()))?;

    let eku = parsed
        .extended_key_usage()
        .map_err(|e| TrustError::CertificateParse(e.to_string()))?;

    let mut roles = Role::UNKNOWN;
    if let Some(eku) = eku {
        for oid in &eku.value.other {
            roles = roles | role_for_oid(&oid.to_id_string());
        }
    }
    Ok(roles)
}

/// Check an asserted role against the peer's leaf certificate
///
/// Returns `Ok(true)` when every asserted role bit is embedded in the leaf
/// certificate's extended-key-usage identifiers. An empty assertion never
/// matches. The chain must hold at least the leaf certificate.
pub fn verify_role(chain: &[CertificateDer<'_>], asserted: Role) -> Result<bool, TrustError> {
    let leaf = chain.first().ok_or(TrustError::NoCertificate)?;
    let embedded = certificate_roles(leaf)?;
    let matched = embedded.has(asserted);
    if !matched {
        debug!(%asserted, %embedded, "certificate role verification failed");
    }
    Ok(matched)
}

// Role-verification tests that depend on generated certificate fixtures live
// in `tests/verify.rs`. They use the `corral-certs` dev-dependency, which
// depends back on `corral-trust`; compiling them inline would build two
// distinct copies of this crate and the `Role` types would fail to unify.
