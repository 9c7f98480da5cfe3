//! Self-signed CA and role-leaf generation for development and fixtures
//!
//! Generated leaves carry one extended-key-usage identifier per role bit,
//! matching the certificate contract the handshake verifies against.

use crate::CertError;
use corral_trust::{oid_for_role, Role};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;
use std::time::SystemTime;

/// Validity window for generated material (two years)
const VALIDITY_SECS: u64 = 2 * 365 * 24 * 60 * 60;

/// A throwaway certificate authority for issuing role certificates
pub struct CertAuthority {
    cert: rcgen::Certificate,
    key_pair: KeyPair,
}

/// A generated leaf certificate with its private key
pub struct GeneratedCert {
    /// Certificate in DER format
    pub cert_der: CertificateDer<'static>,

    /// Private key in DER format
    pub key_der: PrivateKeyDer<'static>,

    /// Certificate in PEM format
    pub cert_pem: String,

    /// Private key in PEM format
    pub key_pem: String,
}

impl GeneratedCert {
    /// Save certificate and key to separate PEM files
    pub fn save_to_files(&self, cert_path: &Path, key_path: &Path) -> Result<(), CertError> {
        std::fs::write(cert_path, &self.cert_pem)?;
        std::fs::write(key_path, &self.key_pem)?;
        Ok(())
    }

    /// Save certificate and key to one combined PEM file
    pub fn save_combined(&self, path: &Path) -> Result<(), CertError> {
        std::fs::write(path, format!("{}{}", self.cert_pem, self.key_pem))?;
        Ok(())
    }
}

/// Generate a self-signed certificate authority
pub fn generate_ca(common_name: &str) -> Result<CertAuthority, CertError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    set_validity(&mut params)?;

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(CertAuthority { cert, key_pair })
}

impl CertAuthority {
    /// The CA certificate in PEM format (the peer trust anchor)
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    /// Save the CA certificate to a PEM file
    pub fn save_cert(&self, path: &Path) -> Result<(), CertError> {
        std::fs::write(path, self.cert.pem())?;
        Ok(())
    }

    /// Issue a leaf certificate embedding one identifier per role bit
    pub fn issue_role_cert(
        &self,
        roles: Role,
        subject_alt_names: &[String],
    ) -> Result<GeneratedCert, CertError> {
        let mut params = CertificateParams::new(subject_alt_names.to_vec())?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, format!("corral {}", roles));
        params.distinguished_name = dn;

        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        for role in roles.iter() {
            let oid = oid_for_role(role)?;
            params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::Other(oid_components(oid)?));
        }

        params.serial_number = Some(rcgen::SerialNumber::from(rand::random::<u64>()));
        set_validity(&mut params)?;

        let key_pair = KeyPair::generate()?;
        let cert = params.signed_by(&key_pair, &self.cert, &self.key_pair)?;

        let key_der = PrivateKeyDer::try_from(key_pair.serialize_der())
            .map_err(|e| CertError::InvalidPem(format!("{e:?}")))?;

        Ok(GeneratedCert {
            cert_der: CertificateDer::from(cert.der().to_vec()),
            key_der,
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

fn set_validity(params: &mut CertificateParams) -> Result<(), CertError> {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| CertError::Validity(e.to_string()))?
        .as_secs();

    // back-dated a day to absorb clock skew between peers
    params.not_before = time::OffsetDateTime::from_unix_timestamp(now as i64 - 24 * 60 * 60)
        .map_err(|e| CertError::Validity(e.to_string()))?;
    params.not_after = time::OffsetDateTime::from_unix_timestamp((now + VALIDITY_SECS) as i64)
        .map_err(|e| CertError::Validity(e.to_string()))?;
    Ok(())
}

fn oid_components(oid: &str) -> Result<Vec<u64>, CertError> {
    oid.split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| CertError::InvalidOid(oid.to_string()))
        })
        .collect()
}
