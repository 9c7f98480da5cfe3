//! Client configuration

use crate::ClientError;
use corral_connection::{TlsSettings, TransportKind};
use corral_trust::Role;
use std::path::PathBuf;

/// Configuration for one client handle
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate server endpoints, tried in order
    pub servers: Vec<String>,
    /// Stream-socket kind the endpoints refer to
    pub transport: TransportKind,
    /// Role(s) asserted at handshake
    pub role: Role,
    /// Trust-anchor certificate path
    pub ca_cert_path: PathBuf,
    /// Leaf certificate path; may also carry the private key
    pub cert_path: PathBuf,
    /// Private key path when not combined into `cert_path`
    pub key_path: Option<PathBuf>,
    /// TLS server name; defaults to the host portion of each endpoint
    pub server_name: Option<String>,
    /// Require the server certificate to embed the server role
    pub verify_server_role: bool,
    /// Where the persisted UUID store lives; `None` disables persistence
    pub uuid_store_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub(crate) fn tls(&self) -> TlsSettings {
        let mut settings = TlsSettings::new(&self.ca_cert_path, &self.cert_path);
        if let Some(key_path) = &self.key_path {
            settings = settings.with_key_path(key_path);
        }
        settings
    }

    /// Validate dial parameters
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.servers.is_empty() {
            return Err(ClientError::Configuration(
                "no server endpoints configured".to_string(),
            ));
        }
        if !self.role.is_valid() {
            return Err(ClientError::Configuration(format!(
                "invalid role: {}",
                self.role
            )));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    servers: Vec<String>,
    transport: TransportKind,
    role: Role,
    ca_cert_path: Option<PathBuf>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
    server_name: Option<String>,
    verify_server_role: bool,
    uuid_store_path: Option<PathBuf>,
}

impl ClientConfigBuilder {
    pub fn server(mut self, endpoint: impl Into<String>) -> Self {
        self.servers.push(endpoint.into());
        self
    }

    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
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

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn verify_server_role(mut self, verify: bool) -> Self {
        self.verify_server_role = verify;
        self
    }

    pub fn uuid_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.uuid_store_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let ca_cert_path = self
            .ca_cert_path
            .ok_or_else(|| ClientError::Configuration("ca_cert_path is required".to_string()))?;
        let cert_path = self
            .cert_path
            .ok_or_else(|| ClientError::Configuration("cert_path is required".to_string()))?;
        if !self.role.is_valid() {
            return Err(ClientError::Configuration(format!(
                "invalid role: {}",
                self.role
            )));
        }

        Ok(ClientConfig {
            servers: self.servers,
            transport: self.transport,
            role: self.role,
            ca_cert_path,
            cert_path,
            key_path: self.key_path,
            server_name: self.server_name,
            verify_server_role: self.verify_server_role,
            uuid_store_path: self.uuid_store_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .server("127.0.0.1:8888")
            .role(Role::AGENT)
            .ca_cert_path("/etc/corral/ca.pem")
            .cert_path("/etc/corral/agent.pem")
            .build()
            .unwrap();

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.role, Role::AGENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_missing_certs() {
        let result = ClientConfig::builder()
            .server("127.0.0.1:8888")
            .role(Role::AGENT)
            .build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_config_builder_missing_role() {
        let result = ClientConfig::builder()
            .server("127.0.0.1:8888")
            .ca_cert_path("/etc/corral/ca.pem")
            .cert_path("/etc/corral/agent.pem")
            .build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_validate_requires_endpoints() {
        let config = ClientConfig::builder()
            .role(Role::CONTROLLER)
            .ca_cert_path("/etc/corral/ca.pem")
            .cert_path("/etc/corral/controller.pem")
            .build()
            .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ClientError::Configuration(_))
        ));
    }
}
