//! Corral client - the handle orchestrator components use
//!
//! A [`Client`] dials a control-plane server, sends typed frames, and
//! receives asynchronous notifications through a registered [`Notifier`].
//! It owns the reconnection state machine and a persisted identity that
//! survives process restarts.

pub mod backoff;
pub mod client;
pub mod config;
pub mod identity;

pub use backoff::{BackoffPolicy, NoBackoff, TableBackoff};
pub use client::{Client, ClientOptions, ConnectionState};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use identity::UuidRegistry;

pub use corral_connection::{Notifier, PeerInfo};

use corral_connection::SessionError;
use thiserror::Error;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid operation: {0}")]
    State(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(#[from] SessionError),
}
