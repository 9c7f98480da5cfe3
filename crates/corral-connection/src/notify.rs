//! Notifier capability trait
//!
//! Orchestrator components observe the control plane exclusively through
//! this trait: one callback per message class plus connectivity callbacks.
//! They never touch wire format or routing tables directly.

use async_trait::async_trait;
use corral_proto::{Frame, FrameKind};
use corral_trust::Role;
use tracing::warn;
use uuid::Uuid;

/// Identity of the peer on the other side of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub uuid: Uuid,
    pub role: Role,
}

/// Callbacks a control-plane consumer registers
///
/// All methods default to no-ops so a component only overrides the message
/// classes it cares about.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// A COMMAND frame arrived
    async fn command(&self, frame: Frame) {
        let _ = frame;
    }

    /// A STATUS frame arrived
    async fn status(&self, frame: Frame) {
        let _ = frame;
    }

    /// An EVENT frame arrived
    async fn event(&self, frame: Frame) {
        let _ = frame;
    }

    /// An ERROR frame arrived
    async fn error(&self, frame: Frame) {
        let _ = frame;
    }

    /// A session to `peer` was established; fires once per (re)connection
    async fn connected(&self, peer: PeerInfo) {
        let _ = peer;
    }

    /// The session to `peer` went away; fires once per teardown
    async fn disconnected(&self, peer: PeerInfo) {
        let _ = peer;
    }
}

/// Route one post-handshake frame to the matching callback
pub async fn dispatch(notifier: &dyn Notifier, frame: Frame) {
    match frame.kind {
        FrameKind::Command(_) => notifier.command(frame).await,
        FrameKind::Status(_) => notifier.status(frame).await,
        FrameKind::Event(_) => notifier.event(frame).await,
        FrameKind::Error(_) => notifier.error(frame).await,
        FrameKind::Connect | FrameKind::Connected => {
            warn!(%frame, "handshake frame received after handshake, dropping");
        }
    }
}
