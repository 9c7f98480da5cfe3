//! Optional per-frame tracing
//!
//! A sender may attach a trace header carrying an opaque label, a path
//! trace, or both. Labels are echoed unchanged by every hop and correlate
//! the frames of one logical workflow; path traces accumulate a hop counter
//! and per-hop timestamps so the terminal recipient can reconstruct total
//! and per-hop latency.

use crate::frame::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;
use uuid::Uuid;

/// Tracing errors
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("frame carries no trace data")]
    NoTraceData,
}

/// What a sender asks to be traced
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub label: Option<Vec<u8>>,
    pub path_trace: bool,
}

impl TraceOptions {
    /// Correlate frames of one workflow under an opaque label
    pub fn labeled(label: Vec<u8>) -> Self {
        Self {
            label: Some(label),
            path_trace: false,
        }
    }

    /// Record hop count and per-hop timestamps
    pub fn path() -> Self {
        Self {
            label: None,
            path_trace: true,
        }
    }

    pub fn with_path_trace(mut self) -> Self {
        self.path_trace = true;
        self
    }
}

/// One relay hop: the relaying node and when it forwarded the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHop {
    pub node: Uuid,
    /// Microseconds since the Unix epoch
    pub timestamp_us: i64,
}

impl TraceHop {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp_us)
    }
}

/// Per-frame trace metadata, mutated by each relay hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    /// Opaque correlation label, echoed unchanged end to end
    pub label: Option<Vec<u8>>,
    /// Whether relays should stamp this frame
    pub path_trace: bool,
    /// Number of relay hops taken so far; never decreases
    pub path_length: u32,
    /// One entry per relay hop when `path_trace` is set
    pub hops: Vec<TraceHop>,
}

impl TraceHeader {
    pub fn from_options(options: TraceOptions) -> Self {
        Self {
            label: options.label,
            path_trace: options.path_trace,
            path_length: 0,
            hops: Vec::new(),
        }
    }

    /// Stamp one relay hop
    pub fn record_hop(&mut self, node: Uuid) {
        self.path_length += 1;
        self.hops.push(TraceHop {
            node,
            timestamp_us: Utc::now().timestamp_micros(),
        });
    }

    /// Wall time between the first and last recorded hop
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let first = self.hops.first()?;
        let last = self.hops.last()?;
        Some(chrono::Duration::microseconds(
            last.timestamp_us - first.timestamp_us,
        ))
    }
}

/// Render a human-readable summary of a frame's trace data
pub fn dump_trace(frame: &Frame) -> Result<String, TraceError> {
    let trace = frame.trace.as_ref().ok_or(TraceError::NoTraceData)?;

    let mut out = String::new();
    let _ = writeln!(out, "trace for {} from {}", frame.kind, frame.source);

    if let Some(label) = &trace.label {
        let _ = writeln!(out, "  label: {}", String::from_utf8_lossy(label));
    }

    if trace.path_trace {
        let _ = writeln!(out, "  path length: {}", trace.path_length);
        let mut previous: Option<i64> = None;
        for (i, hop) in trace.hops.iter().enumerate() {
            let at = hop
                .instant()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "<invalid timestamp>".to_string());
            match previous {
                Some(prev) => {
                    let _ = writeln!(
                        out,
                        "  hop {}: {} at {} (+{}us)",
                        i + 1,
                        hop.node,
                        at,
                        hop.timestamp_us - prev
                    );
                }
                None => {
                    let _ = writeln!(out, "  hop {}: {} at {}", i + 1, hop.node, at);
                }
            }
            previous = Some(hop.timestamp_us);
        }
        if let Some(elapsed) = trace.elapsed() {
            let _ = writeln!(out, "  total: {}us", elapsed.num_microseconds().unwrap_or(0));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CommandOp, FrameKind};
    use bytes::Bytes;

    fn traced_frame(options: TraceOptions) -> Frame {
        Frame::new(
            FrameKind::Command(CommandOp::Start),
            Uuid::new_v4(),
            Bytes::from_static(b"payload"),
        )
        .with_trace(TraceHeader::from_options(options))
    }

    #[test]
    fn test_record_hop_increments_path_length() {
        let mut trace = TraceHeader::from_options(TraceOptions::path());
        assert_eq!(trace.path_length, 0);

        let relay = Uuid::new_v4();
        trace.record_hop(relay);
        trace.record_hop(relay);

        assert_eq!(trace.path_length, 2);
        assert_eq!(trace.hops.len(), 2);
        assert!(trace.hops[1].timestamp_us >= trace.hops[0].timestamp_us);
    }

    #[test]
    fn test_elapsed() {
        let mut trace = TraceHeader::from_options(TraceOptions::path());
        assert!(trace.elapsed().is_none());

        trace.hops.push(TraceHop {
            node: Uuid::new_v4(),
            timestamp_us: 1_000,
        });
        trace.hops.push(TraceHop {
            node: Uuid::new_v4(),
            timestamp_us: 3_500,
        });
        trace.path_length = 2;

        assert_eq!(trace.elapsed().unwrap(), chrono::Duration::microseconds(2_500));
    }

    #[test]
    fn test_dump_trace_without_data() {
        let frame = Frame::new(
            FrameKind::Command(CommandOp::Start),
            Uuid::new_v4(),
            Bytes::new(),
        );
        assert!(matches!(dump_trace(&frame), Err(TraceError::NoTraceData)));
    }

    #[test]
    fn test_dump_trace_label() {
        let frame = traced_frame(TraceOptions::labeled(b"deploy-7".to_vec()));
        let out = dump_trace(&frame).unwrap();
        assert!(out.contains("label: deploy-7"));
    }

    #[test]
    fn test_dump_trace_path() {
        let mut frame = traced_frame(TraceOptions::path());
        if let Some(trace) = frame.trace.as_mut() {
            trace.record_hop(Uuid::new_v4());
            trace.record_hop(Uuid::new_v4());
        }

        let out = dump_trace(&frame).unwrap();
        assert!(out.contains("path length: 2"));
        assert!(out.contains("hop 1:"));
        assert!(out.contains("hop 2:"));
        assert!(out.contains("total:"));
    }

    #[test]
    fn test_label_survives_serde() {
        let label = vec![0u8, 159, 146, 150]; // not valid UTF-8, still opaque
        let trace = TraceHeader::from_options(TraceOptions::labeled(label.clone()));

        let bytes = bincode::serialize(&trace).unwrap();
        let back: TraceHeader = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.label.as_deref(), Some(label.as_slice()));
    }
}
