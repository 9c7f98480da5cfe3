//! Server configuration

use crate::ServerError;
use corral_connection::{TlsSettings, TransportKind};
use corral_trust::Role;
use std::path::PathBuf;

/// Configuration for one control-plane server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Stream-socket kind to listen on
    pub transport: TransportKind,
    /// Listen address: `host:port` for TCP, a filesystem path for Unix
    pub bind_addr: String,
    /// Role the server asserts in its CONNECTED replies
    pub role: Role,
    /// Trust-anchor certificate path
    pub ca_cert_path: PathBuf,
    /// Leaf certificate path; may also carry the private key
    pub cert_path: PathBuf,
    /// Private key path when not combined into `cert_path`
    pub key_path: Option<PathBuf>,
    /// Check asserted roles against the peer certificate's identifiers
    pub verify_peer_role: bool,
    /// Reject CONNECTs past this many live sessions
    pub max_sessions: Option<usize>,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub(crate) fn tls(&self) -> TlsSettings {
        let mut settings = TlsSettings::new(&self.ca_cert_path, &self.cert_path);
        if let Some(key_path) = &self.key_path {
            settings = settings.with_key_path(key_path);
        }
        settings
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.bind_addr.is_empty() {
            return Err(ServerError::Configuration(
                "no listen address configured".to_string(),
            ));
        }
        if !self.role.is_valid() {
            return Err(ServerError::Configuration(format!(
                "invalid role: {}",
                self.role
            )));
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    transport: TransportKind,
    bind_addr: Option<String>,
    role: Option<Role>,
    ca_cert_path: Option<PathBuf>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
    verify_peer_role: bool,
    max_sessions: Option<usize>,
}

impl ServerConfigBuilder {
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn verify_peer_role(mut self, verify: bool) -> Self {
        self.verify_peer_role = verify;
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    pub fn build(self) -> Result<ServerConfig, ServerError> {
        let bind_addr = self
            .bind_addr
            .ok_or_else(|| ServerError::Configuration("bind_addr is required".to_string()))?;
        let ca_cert_path = self
            .ca_cert_path
            .ok_or_else(|| ServerError::Configuration("ca_cert_path is required".to_string()))?;
        let cert_path = self
            .cert_path
            .ok_or_else(|| ServerError::Configuration("cert_path is required".to_string()))?;

        Ok(ServerConfig {
            transport: self.transport,
            bind_addr,
            role: self.role.unwrap_or(Role::SERVER),
            ca_cert_path,
            cert_path,
            key_path: self.key_path,
            verify_peer_role: self.verify_peer_role,
            max_sessions: self.max_sessions,
        })
    }
}
