//! Session layer for the corral control plane
//!
//! Provides the transport endpoints (TCP and Unix stream sockets), the TLS
//! configuration builders, the [`Session`] framed I/O wrapper, and the
//! notifier capability trait consumed by orchestrator components.

pub mod endpoint;
pub mod notify;
pub mod session;
pub mod tls;

pub use endpoint::{host_of, Listener, TransportKind};
pub use notify::{dispatch, Notifier, PeerInfo};
pub use session::{recv_frame, send_frame, BoxedStream, Session, SessionError, SessionStream};
pub use tls::TlsSettings;
