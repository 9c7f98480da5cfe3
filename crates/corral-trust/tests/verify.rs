//! Role verification tests that rely on generated certificate fixtures.
//!
//! These live as an integration test rather than an inline `#[cfg(test)]`
//! module because they use the `corral-certs` dev-dependency, which itself
//! depends on `corral-trust`. Compiling them inline would build two distinct
//! copies of `corral-trust` (the `cfg(test)` lib and the one `corral-certs`
//! links), and the `Role` types would fail to unify.

use corral_certs::generate_ca;
use corral_trust::{certificate_roles, verify_role, Role, TrustError};
use rustls::pki_types::CertificateDer;

#[test]
fn test_embedded_role_passes() {
    let ca = generate_ca("corral test CA").unwrap();
    let leaf = ca
        .issue_role_cert(Role::AGENT, &["localhost".to_string()])
        .unwrap();

    let chain = vec![leaf.cert_der.clone()];
    assert!(verify_role(&chain, Role::AGENT).unwrap());
}

#[test]
fn test_missing_role_fails() {
    let ca = generate_ca("corral test CA").unwrap();
    let leaf = ca
        .issue_role_cert(Role::AGENT, &["localhost".to_string()])
        .unwrap();

    let chain = vec![leaf.cert_der.clone()];
    assert!(!verify_role(&chain, Role::SCHEDULER).unwrap());
}

#[test]
fn test_multi_role_certificate() {
    let ca = generate_ca("corral test CA").unwrap();
    let leaf = ca
        .issue_role_cert(Role::AGENT | Role::NETAGENT, &["localhost".to_string()])
        .unwrap();

    let chain = vec![leaf.cert_der.clone()];
    assert!(verify_role(&chain, Role::AGENT).unwrap());
    assert!(verify_role(&chain, Role::NETAGENT).unwrap());
    assert!(verify_role(&chain, Role::AGENT | Role::NETAGENT).unwrap());
    assert!(!verify_role(&chain, Role::CONTROLLER).unwrap());
    assert!(!verify_role(&chain, Role::AGENT | Role::CONTROLLER).unwrap());
}

#[test]
fn test_unknown_assertion_never_matches() {
    let ca = generate_ca("corral test CA").unwrap();
    let leaf = ca
        .issue_role_cert(Role::SERVER, &["localhost".to_string()])
        .unwrap();

    let chain = vec![leaf.cert_der.clone()];
    assert!(!verify_role(&chain, Role::UNKNOWN).unwrap());
}

#[test]
fn test_empty_chain() {
    assert!(matches!(
        verify_role(&[], Role::AGENT),
        Err(TrustError::NoCertificate)
    ));
}

#[test]
fn test_certificate_roles_reads_all_bits() {
    let ca = generate_ca("corral test CA").unwrap();
    let roles = Role::SCHEDULER | Role::CONTROLLER;
    let leaf = ca
        .issue_role_cert(roles, &["localhost".to_string()])
        .unwrap();

    let der = leaf.cert_der.clone();
    assert_eq!(certificate_roles(&der).unwrap(), roles);
}

#[test]
fn test_garbage_certificate_is_a_parse_error() {
    let der = CertificateDer::from(vec![0u8; 16]);
    assert!(matches!(
        certificate_roles(&der),
        Err(TrustError::CertificateParse(_))
    ));
}
