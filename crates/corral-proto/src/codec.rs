//! Deterministic wire codec
//!
//! Layout: `{major u8, minor u8, type u8, operand u8, flags u8,
//! source UUID [16]}` then, when the TRACE flag is set, a u32-length-prefixed
//! bincode trace block, then a u32-length-prefixed payload. Lengths are
//! big-endian.
//!
//! Decoding is two-phase. The framing pass trusts nothing past the version
//! byte until length bounds are checked, and consumes exactly one whole
//! frame; the semantic pass then validates type, operand, and trace block.
//! A semantic failure therefore leaves the buffer aligned on the next frame
//! boundary, so the read loop can answer with an ERROR frame and continue.

use crate::frame::{Frame, FrameKind};
use crate::trace::TraceHeader;
use crate::{ProtoError, MAX_PAYLOAD_SIZE, MAX_TRACE_SIZE, PROTOCOL_MAJOR, PROTOCOL_MINOR};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Fixed header: major, minor, type, operand, flags, 16-byte source UUID
pub const HEADER_LEN: usize = 21;

const FLAG_TRACE: u8 = 0b0000_0001;

/// Control-plane frame codec
pub struct FrameCodec;

impl FrameCodec {
    /// Encode one frame to its wire form
    pub fn encode(frame: &Frame) -> Result<Bytes, ProtoError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge(frame.payload.len()));
        }

        let trace_bytes = match &frame.trace {
            Some(trace) => {
                let bytes = bincode::serialize(trace)
                    .map_err(|e| ProtoError::TraceDecode(e.to_string()))?;
                if bytes.len() > MAX_TRACE_SIZE {
                    return Err(ProtoError::TraceTooLarge(bytes.len()));
                }
                Some(bytes)
            }
            None => None,
        };

        let trace_len = trace_bytes.as_ref().map(|t| 4 + t.len()).unwrap_or(0);
        let mut buf =
            BytesMut::with_capacity(HEADER_LEN + trace_len + 4 + frame.payload.len());

        buf.put_u8(PROTOCOL_MAJOR);
        buf.put_u8(PROTOCOL_MINOR);
        buf.put_u8(frame.kind.frame_type() as u8);
        buf.put_u8(frame.kind.operand());
        buf.put_u8(if trace_bytes.is_some() { FLAG_TRACE } else { 0 });
        buf.put_slice(frame.source.as_bytes());

        if let Some(trace) = trace_bytes {
            buf.put_u32(trace.len() as u32);
            buf.put_slice(&trace);
        }

        buf.put_u32(frame.payload.len() as u32);
        buf.put_slice(&frame.payload);

        Ok(buf.freeze())
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. A recoverable
    /// error (see [`ProtoError::is_recoverable`]) has already consumed the
    /// offending frame; anything else poisons the stream.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtoError> {
        let Some(&major) = buf.first() else {
            return Ok(None);
        };
        if major != PROTOCOL_MAJOR {
            return Err(ProtoError::VersionMismatch {
                expected: PROTOCOL_MAJOR,
                found: major,
            });
        }
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let flags = buf[4];
        let mut offset = HEADER_LEN;

        let trace_len = if flags & FLAG_TRACE != 0 {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let len = read_u32(&buf[offset..]) as usize;
            if len > MAX_TRACE_SIZE {
                return Err(ProtoError::TraceTooLarge(len));
            }
            offset += 4;
            len
        } else {
            0
        };
        offset += trace_len;

        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let payload_len = read_u32(&buf[offset..]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge(payload_len));
        }
        offset += 4;

        if buf.len() < offset + payload_len {
            return Ok(None);
        }

        // One whole frame is buffered; consume it, then validate.
        let frame = buf.split_to(offset + payload_len).freeze();
        Self::parse(frame, flags & FLAG_TRACE != 0, trace_len).map(Some)
    }

    fn parse(mut frame: Bytes, traced: bool, trace_len: usize) -> Result<Frame, ProtoError> {
        frame.advance(2); // major/minor already checked
        let frame_type = frame.get_u8();
        let operand = frame.get_u8();
        frame.advance(1); // flags

        let mut uuid_bytes = [0u8; 16];
        frame.copy_to_slice(&mut uuid_bytes);
        let source = Uuid::from_bytes(uuid_bytes);

        let kind = FrameKind::from_wire(frame_type, operand)?;

        let trace = if traced {
            frame.advance(4);
            let trace_bytes = frame.split_to(trace_len);
            let header: TraceHeader = bincode::deserialize(&trace_bytes)
                .map_err(|e| ProtoError::TraceDecode(e.to_string()))?;
            Some(header)
        } else {
            None
        };

        frame.advance(4);
        Ok(Frame {
            kind,
            source,
            trace,
            payload: frame,
        })
    }
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}
