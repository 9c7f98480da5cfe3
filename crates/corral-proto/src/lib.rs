//! Corral Protocol Definitions
//!
//! This crate defines the control-plane frame format: typed frames with
//! per-type operands, the deterministic wire codec, and the optional
//! per-frame trace header.

pub mod codec;
pub mod frame;
pub mod trace;

pub use codec::FrameCodec;
pub use frame::{
    CommandOp, ConnectPayload, ErrorOp, EventOp, Frame, FrameKind, FrameType, StatusOp,
};
pub use trace::{dump_trace, TraceError, TraceHeader, TraceHop, TraceOptions};

use thiserror::Error;

/// Protocol major version; a mismatch is rejected, never reinterpreted
pub const PROTOCOL_MAJOR: u8 = 1;

/// Protocol minor version; minor revisions stay wire-compatible
pub const PROTOCOL_MINOR: u8 = 0;

/// Maximum payload size (16MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Maximum encoded trace block size
pub const MAX_TRACE_SIZE: usize = 64 * 1024;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("protocol version mismatch: expected major {expected}, got {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("trace block too large: {0} bytes")]
    TraceTooLarge(usize),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("unknown operand {operand} for {frame_type:?} frame")]
    UnknownOperand { frame_type: FrameType, operand: u8 },

    #[error("malformed trace block: {0}")]
    TraceDecode(String),

    #[error("malformed connect payload: {0}")]
    ConnectDecode(String),
}

impl ProtoError {
    /// True when the error was detected after a whole frame was consumed,
    /// leaving the stream aligned for the next frame
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtoError::UnknownFrameType(_)
                | ProtoError::UnknownOperand { .. }
                | ProtoError::TraceDecode(_)
                | ProtoError::ConnectDecode(_)
        )
    }
}
