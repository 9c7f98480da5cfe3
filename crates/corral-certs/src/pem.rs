//! PEM loading helpers
//!
//! A corral peer is configured with two paths: the trust-anchor certificate
//! and its own leaf material. The leaf file may carry the certificate chain
//! and the private key in one file; the loaders filter by PEM block type.

use crate::CertError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load every certificate block from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertError::InvalidPem(e.to_string()))?;

    if certs.is_empty() {
        return Err(CertError::NoCertificate(path.display().to_string()));
    }
    Ok(certs)
}

/// Load the first private key block from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CertError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CertError::InvalidPem(e.to_string()))?
        .ok_or_else(|| CertError::NoPrivateKey(path.display().to_string()))
}
