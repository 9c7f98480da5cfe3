//! Peer roles and their certificate identifiers

use crate::TrustError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Role bitmask asserted by a peer at handshake time
///
/// A peer may hold several roles at once (for instance a node that is both
/// an agent and a network agent). The mask is fixed at provisioning time and
/// immutable after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(u32);

impl Role {
    /// No recognized role
    pub const UNKNOWN: Role = Role(0);
    /// Per-node compute agent
    pub const AGENT: Role = Role(0x01);
    /// Workload scheduler
    pub const SCHEDULER: Role = Role(0x02);
    /// Cluster controller
    pub const CONTROLLER: Role = Role(0x04);
    /// Network agent
    pub const NETAGENT: Role = Role(0x08);
    /// Control-plane server
    pub const SERVER: Role = Role(0x10);
    /// Compute-node-controller-instance agent
    pub const CNCIAGENT: Role = Role(0x20);

    const ALL: [(Role, &'static str); 6] = [
        (Role::AGENT, "agent"),
        (Role::SCHEDULER, "scheduler"),
        (Role::CONTROLLER, "controller"),
        (Role::NETAGENT, "netagent"),
        (Role::SERVER, "server"),
        (Role::CNCIAGENT, "cnciagent"),
    ];

    /// Build a role from raw wire bits
    pub fn from_bits(bits: u32) -> Self {
        Role(bits)
    }

    /// Raw wire bits
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if every role bit in `other` is held
    pub fn has(self, other: Role) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }

    /// True if the mask only contains defined role bits, at least one
    pub fn is_valid(self) -> bool {
        let known: u32 = Self::ALL.iter().map(|(r, _)| r.0).sum();
        self.0 != 0 && self.0 & !known == 0
    }

    /// Iterate the single-bit roles contained in this mask
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Self::ALL
            .iter()
            .filter(move |(r, _)| self.has(*r))
            .map(|(r, _)| *r)
    }
}

impl BitOr for Role {
    type Output = Role;

    fn bitor(self, rhs: Role) -> Role {
        Role(self.0 | rhs.0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "unknown");
        }
        let names: Vec<&str> = Self::ALL
            .iter()
            .filter(|(r, _)| self.has(*r))
            .map(|(_, n)| *n)
            .collect();
        if names.is_empty() {
            return write!(f, "invalid({:#x})", self.0);
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Private-enterprise OID arc carrying one identifier per role
pub const ROLE_OID_ARC: &str = "1.3.6.1.4.1.58544.1";

pub const OID_AGENT: &str = "1.3.6.1.4.1.58544.1.1";
pub const OID_SCHEDULER: &str = "1.3.6.1.4.1.58544.1.2";
pub const OID_CONTROLLER: &str = "1.3.6.1.4.1.58544.1.3";
pub const OID_NETAGENT: &str = "1.3.6.1.4.1.58544.1.4";
pub const OID_SERVER: &str = "1.3.6.1.4.1.58544.1.5";
pub const OID_CNCIAGENT: &str = "1.3.6.1.4.1.58544.1.6";

/// Map a single-bit role to its certificate identifier
///
/// Fails for `UNKNOWN` and for masks holding more than one role; a
/// certificate carries one identifier per role it claims.
pub fn oid_for_role(role: Role) -> Result<&'static str, TrustError> {
    match role {
        Role::AGENT => Ok(OID_AGENT),
        Role::SCHEDULER => Ok(OID_SCHEDULER),
        Role::CONTROLLER => Ok(OID_CONTROLLER),
        Role::NETAGENT => Ok(OID_NETAGENT),
        Role::SERVER => Ok(OID_SERVER),
        Role::CNCIAGENT => Ok(OID_CNCIAGENT),
        other => Err(TrustError::UnknownRole(other)),
    }
}

/// Map a certificate identifier back to a role
///
/// Returns [`Role::UNKNOWN`] for unrecognized identifiers so an unexpected
/// peer fails the role comparison instead of aborting the handshake path.
pub fn role_for_oid(oid: &str) -> Role {
    match oid {
        OID_AGENT => Role::AGENT,
        OID_SCHEDULER => Role::SCHEDULER,
        OID_CONTROLLER => Role::CONTROLLER,
        OID_NETAGENT => Role::NETAGENT,
        OID_SERVER => Role::SERVER,
        OID_CNCIAGENT => Role::CNCIAGENT,
        _ => Role::UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_has() {
        let combined = Role::AGENT | Role::NETAGENT;
        assert!(combined.has(Role::AGENT));
        assert!(combined.has(Role::NETAGENT));
        assert!(!combined.has(Role::SCHEDULER));
        assert!(combined.has(combined));
        assert!(!Role::UNKNOWN.has(Role::AGENT));
    }

    #[test]
    fn test_unknown_never_held() {
        // has() on an empty mask is false by definition, so an unrecognized
        // peer can never satisfy a role check
        assert!(!Role::AGENT.has(Role::UNKNOWN));
        assert!(!Role::UNKNOWN.has(Role::UNKNOWN));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::SCHEDULER.to_string(), "scheduler");
        assert_eq!((Role::AGENT | Role::CNCIAGENT).to_string(), "agent|cnciagent");
        assert_eq!(Role::UNKNOWN.to_string(), "unknown");
    }

    #[test]
    fn test_role_validity() {
        assert!(Role::CONTROLLER.is_valid());
        assert!((Role::AGENT | Role::SERVER).is_valid());
        assert!(!Role::UNKNOWN.is_valid());
        assert!(!Role::from_bits(0x4000).is_valid());
    }

    #[test]
    fn test_oid_round_trip() {
        for role in (Role::AGENT
            | Role::SCHEDULER
            | Role::CONTROLLER
            | Role::NETAGENT
            | Role::SERVER
            | Role::CNCIAGENT)
            .iter()
        {
            let oid = oid_for_role(role).unwrap();
            assert_eq!(role_for_oid(oid), role);
        }
    }

    #[test]
    fn test_oid_for_unknown_role_fails() {
        assert!(matches!(
            oid_for_role(Role::UNKNOWN),
            Err(TrustError::UnknownRole(_))
        ));
        // multi-bit masks have no single identifier either
        assert!(oid_for_role(Role::AGENT | Role::SCHEDULER).is_err());
    }

    #[test]
    fn test_unrecognized_oid_maps_to_unknown() {
        assert_eq!(role_for_oid("1.2.3.4.5"), Role::UNKNOWN);
        assert_eq!(role_for_oid(""), Role::UNKNOWN);
    }

    #[test]
    fn test_role_iter() {
        let mask = Role::SCHEDULER | Role::SERVER;
        let singles: Vec<Role> = mask.iter().collect();
        assert_eq!(singles, vec![Role::SCHEDULER, Role::SERVER]);
    }
}
