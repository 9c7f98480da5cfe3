//! Forwarding rules
//!
//! Rules are keyed by a frame's `(type, operand)` pair and declared once at
//! server configuration; the table is immutable while the server runs.

use crate::ServerError;
use corral_proto::{Frame, FrameKind};
use corral_trust::Role;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Computes the recipient set for one frame at dispatch time
pub type Forwarder = Arc<dyn Fn(&Frame) -> Vec<Uuid> + Send + Sync>;

/// Destination of a forwarding rule
pub enum ForwardDest {
    /// Relay to every currently connected session holding the role. The
    /// destination set is computed at dispatch time and does not exclude
    /// the sending session; rule authors route between distinct roles to
    /// avoid echoing a frame to its source.
    Role(Role),
    /// Relay to exactly the UUID set the forwarder returns; unknown UUIDs
    /// are skipped. Enables content-based routing.
    Forwarder(Forwarder),
}

impl fmt::Debug for ForwardDest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardDest::Role(role) => write!(f, "Role({role})"),
            ForwardDest::Forwarder(_) => write!(f, "Forwarder(..)"),
        }
    }
}

/// Table of forwarding rules, one per `(frame type, operand)` key
#[derive(Debug, Default)]
pub struct ForwardTable {
    rules: HashMap<FrameKind, ForwardDest>,
}

impl ForwardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule
    ///
    /// At most one rule may be active per key; a second registration for
    /// the same key is rejected as ambiguous rather than merged. Handshake
    /// frames are never forwarded.
    pub fn add(&mut self, kind: FrameKind, dest: ForwardDest) -> Result<(), ServerError> {
        if matches!(kind, FrameKind::Connect | FrameKind::Connected) {
            return Err(ServerError::InvalidRule(kind));
        }
        if self.rules.contains_key(&kind) {
            return Err(ServerError::DuplicateRule(kind));
        }
        self.rules.insert(kind, dest);
        Ok(())
    }

    pub fn get(&self, kind: &FrameKind) -> Option<&ForwardDest> {
        self.rules.get(kind)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
