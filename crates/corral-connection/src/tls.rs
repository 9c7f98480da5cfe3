//! TLS configuration for control-plane sessions
//!
//! Both sides authenticate with certificates signed by the configured trust
//! anchor: the server presents its leaf and requires a client certificate,
//! the client presents its leaf and validates the server chain. Role
//! verification on top of the validated chain lives in `corral-trust`.

use crate::endpoint::{host_of, TransportKind};
use crate::session::{BoxedStream, SessionError};
use corral_certs::{load_certs, load_private_key};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Paths to the PEM material a peer is provisioned with
///
/// `cert_path` may be a combined file carrying both the leaf chain and the
/// private key; set `key_path` when the key lives in its own file.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub ca_cert_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: Option<PathBuf>,
}

impl TlsSettings {
    pub fn new(ca_cert_path: impl Into<PathBuf>, cert_path: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert_path: ca_cert_path.into(),
            cert_path: cert_path.into(),
            key_path: None,
        }
    }

    pub fn with_key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    fn roots(&self) -> Result<RootCertStore, SessionError> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(&self.ca_cert_path).map_err(|e| {
            SessionError::Configuration(format!("trust anchor {:?}: {e}", self.ca_cert_path))
        })? {
            roots
                .add(cert)
                .map_err(|e| SessionError::Tls(format!("invalid trust anchor: {e}")))?;
        }
        Ok(roots)
    }

    fn leaf(
        &self,
    ) -> Result<
        (
            Vec<CertificateDer<'static>>,
            rustls::pki_types::PrivateKeyDer<'static>,
        ),
        SessionError,
    > {
        let certs = load_certs(&self.cert_path).map_err(|e| {
            SessionError::Configuration(format!("certificate {:?}: {e}", self.cert_path))
        })?;
        let key_path = self.key_path.as_ref().unwrap_or(&self.cert_path);
        let key = load_private_key(key_path).map_err(|e| {
            SessionError::Configuration(format!("private key {key_path:?}: {e}"))
        })?;
        Ok((certs, key))
    }

    /// Build the client-side TLS connector
    pub fn connector(&self) -> Result<TlsConnector, SessionError> {
        ensure_crypto_provider();

        let roots = self.roots()?;
        let (certs, key) = self.leaf()?;

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| SessionError::Tls(format!("invalid client cert/key: {e}")))?;

        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// Build the server-side TLS acceptor; client certificates are required
    pub fn acceptor(&self) -> Result<TlsAcceptor, SessionError> {
        ensure_crypto_provider();

        let roots = self.roots()?;
        let (certs, key) = self.leaf()?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| SessionError::Tls(format!("client verifier: {e}")))?;

        let config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| SessionError::Tls(format!("invalid server cert/key: {e}")))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }

    /// Dial `target` and complete the TLS handshake
    ///
    /// Returns the established stream plus the server's certificate chain
    /// for role verification.
    pub async fn connect(
        &self,
        kind: TransportKind,
        target: &str,
        server_name: Option<&str>,
    ) -> Result<(BoxedStream, Vec<CertificateDer<'static>>), SessionError> {
        let connector = self.connector()?;

        let name = server_name.unwrap_or_else(|| host_of(target)).to_string();
        let server_name = ServerName::try_from(name)
            .map_err(|e| SessionError::Configuration(format!("invalid server name: {e}")))?;

        let raw = kind.connect(target).await?;
        let stream = connector
            .connect(server_name, raw)
            .await
            .map_err(SessionError::Io)?;

        let peer_certs = owned_chain(stream.get_ref().1.peer_certificates());
        Ok((Box::new(stream), peer_certs))
    }

    /// Complete a server-side TLS handshake on an accepted raw stream
    ///
    /// Returns the established stream plus the client's certificate chain
    /// for role verification.
    pub async fn accept(
        &self,
        acceptor: &TlsAcceptor,
        raw: BoxedStream,
    ) -> Result<(BoxedStream, Vec<CertificateDer<'static>>), SessionError> {
        let stream = acceptor.accept(raw).await.map_err(SessionError::Io)?;
        let peer_certs = owned_chain(stream.get_ref().1.peer_certificates());
        Ok((Box::new(stream), peer_certs))
    }
}

fn owned_chain(chain: Option<&[CertificateDer<'_>]>) -> Vec<CertificateDer<'static>> {
    chain
        .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default()
}

// Initialize rustls crypto provider
static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}
