//! Corral server - accept loop and forwarding engine
//!
//! The server authenticates many client sessions and routes incoming frames
//! to other connected sessions according to a table of forwarding rules:
//! by explicit role, or through a programmatic forwarder computing the
//! recipient set per frame. Frames matching no rule are delivered to the
//! server's own notifier.

pub mod config;
pub mod forward;
pub mod server;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use forward::{ForwardDest, ForwardTable, Forwarder};
pub use server::Server;

pub use corral_connection::{Notifier, PeerInfo};

use corral_connection::SessionError;
use corral_proto::FrameKind;
use thiserror::Error;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("duplicate forwarding rule for {0}")]
    DuplicateRule(FrameKind),

    #[error("no forwarding rule may target {0} frames")]
    InvalidRule(FrameKind),

    #[error("transport error: {0}")]
    Transport(#[from] SessionError),
}
