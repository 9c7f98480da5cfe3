//! Frame types, operands, and payloads

use crate::trace::TraceHeader;
use crate::ProtoError;
use bytes::Bytes;
use corral_trust::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wire frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Command = 0,
    Status = 1,
    Event = 2,
    Error = 3,
    Connect = 4,
    Connected = 5,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(FrameType::Command),
            1 => Ok(FrameType::Status),
            2 => Ok(FrameType::Event),
            3 => Ok(FrameType::Error),
            4 => Ok(FrameType::Connect),
            5 => Ok(FrameType::Connected),
            _ => Err(ProtoError::UnknownFrameType(value)),
        }
    }
}

/// Command operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandOp {
    Start = 0,
    Stop = 1,
    Restart = 2,
    Delete = 3,
    Stats = 4,
    Evacuate = 5,
    AttachVolume = 6,
    DetachVolume = 7,
}

/// Status operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusOp {
    Connected = 0,
    Ready = 1,
    Full = 2,
    Offline = 3,
    Maintenance = 4,
}

/// Event operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventOp {
    NodeConnected = 0,
    NodeDisconnected = 1,
    TenantAdded = 2,
    TenantRemoved = 3,
    InstanceDeleted = 4,
    ConcentratorAdded = 5,
    PublicIpAssigned = 6,
    TraceReport = 7,
}

/// Error operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorOp {
    NoError = 0,
    InvalidFrameType = 1,
    InvalidConfiguration = 2,
    ConnectionFailure = 3,
    ConnectionAborted = 4,
    StartFailure = 5,
    StopFailure = 6,
    RestartFailure = 7,
    DeleteFailure = 8,
}

/// A frame's type together with its typed operand
///
/// CONNECT and CONNECTED are handshake frames with a fixed zero operand;
/// the other four types carry one operand from their own operand space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Command(CommandOp),
    Status(StatusOp),
    Event(EventOp),
    Error(ErrorOp),
    Connect,
    Connected,
}

impl FrameKind {
    pub fn frame_type(self) -> FrameType {
        match self {
            FrameKind::Command(_) => FrameType::Command,
            FrameKind::Status(_) => FrameType::Status,
            FrameKind::Event(_) => FrameType::Event,
            FrameKind::Error(_) => FrameType::Error,
            FrameKind::Connect => FrameType::Connect,
            FrameKind::Connected => FrameType::Connected,
        }
    }

    pub fn operand(self) -> u8 {
        match self {
            FrameKind::Command(op) => op as u8,
            FrameKind::Status(op) => op as u8,
            FrameKind::Event(op) => op as u8,
            FrameKind::Error(op) => op as u8,
            FrameKind::Connect | FrameKind::Connected => 0,
        }
    }

    /// Rebuild a kind from its wire bytes, validating the operand range
    pub fn from_wire(frame_type: u8, operand: u8) -> Result<Self, ProtoError> {
        let frame_type = FrameType::try_from(frame_type)?;
        let unknown = || ProtoError::UnknownOperand {
            frame_type,
            operand,
        };
        match frame_type {
            FrameType::Command => Ok(FrameKind::Command(match operand {
                0 => CommandOp::Start,
                1 => CommandOp::Stop,
                2 => CommandOp::Restart,
                3 => CommandOp::Delete,
                4 => CommandOp::Stats,
                5 => CommandOp::Evacuate,
                6 => CommandOp::AttachVolume,
                7 => CommandOp::DetachVolume,
                _ => return Err(unknown()),
            })),
            FrameType::Status => Ok(FrameKind::Status(match operand {
                0 => StatusOp::Connected,
                1 => StatusOp::Ready,
                2 => StatusOp::Full,
                3 => StatusOp::Offline,
                4 => StatusOp::Maintenance,
                _ => return Err(unknown()),
            })),
            FrameType::Event => Ok(FrameKind::Event(match operand {
                0 => EventOp::NodeConnected,
                1 => EventOp::NodeDisconnected,
                2 => EventOp::TenantAdded,
                3 => EventOp::TenantRemoved,
                4 => EventOp::InstanceDeleted,
                5 => EventOp::ConcentratorAdded,
                6 => EventOp::PublicIpAssigned,
                7 => EventOp::TraceReport,
                _ => return Err(unknown()),
            })),
            FrameType::Error => Ok(FrameKind::Error(match operand {
                0 => ErrorOp::NoError,
                1 => ErrorOp::InvalidFrameType,
                2 => ErrorOp::InvalidConfiguration,
                3 => ErrorOp::ConnectionFailure,
                4 => ErrorOp::ConnectionAborted,
                5 => ErrorOp::StartFailure,
                6 => ErrorOp::StopFailure,
                7 => ErrorOp::RestartFailure,
                8 => ErrorOp::DeleteFailure,
                _ => return Err(unknown()),
            })),
            FrameType::Connect => match operand {
                0 => Ok(FrameKind::Connect),
                _ => Err(unknown()),
            },
            FrameType::Connected => match operand {
                0 => Ok(FrameKind::Connected),
                _ => Err(unknown()),
            },
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Command(op) => write!(f, "COMMAND/{op:?}"),
            FrameKind::Status(op) => write!(f, "STATUS/{op:?}"),
            FrameKind::Event(op) => write!(f, "EVENT/{op:?}"),
            FrameKind::Error(op) => write!(f, "ERROR/{op:?}"),
            FrameKind::Connect => write!(f, "CONNECT"),
            FrameKind::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// One control-plane frame
///
/// Immutable once built; constructed per send and discarded after delivery.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub source: Uuid,
    pub trace: Option<TraceHeader>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, source: Uuid, payload: Bytes) -> Self {
        Self {
            kind,
            source,
            trace: None,
            payload,
        }
    }

    pub fn with_trace(mut self, trace: TraceHeader) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Build a CONNECT frame asserting `role` for `uuid`
    pub fn connect(uuid: Uuid, role: Role) -> Result<Self, ProtoError> {
        Ok(Self::new(
            FrameKind::Connect,
            uuid,
            ConnectPayload { uuid, role }.encode()?,
        ))
    }

    /// Build the CONNECTED reply carrying the server's identity
    pub fn connected(uuid: Uuid, role: Role) -> Result<Self, ProtoError> {
        Ok(Self::new(
            FrameKind::Connected,
            uuid,
            ConnectPayload { uuid, role }.encode()?,
        ))
    }

    /// Parse the CONNECT/CONNECTED payload of a handshake frame
    pub fn connect_payload(&self) -> Result<ConnectPayload, ProtoError> {
        ConnectPayload::decode(&self.payload)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} ({} byte payload)",
            self.kind,
            self.source,
            self.payload.len()
        )
    }
}

/// Identity carried by CONNECT and CONNECTED frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub uuid: Uuid,
    pub role: Role,
}

impl ConnectPayload {
    pub fn encode(&self) -> Result<Bytes, ProtoError> {
        let bytes = bincode::serialize(self).map_err(|e| ProtoError::ConnectDecode(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        bincode::deserialize(payload).map_err(|e| ProtoError::ConnectDecode(e.to_string()))
    }
}
