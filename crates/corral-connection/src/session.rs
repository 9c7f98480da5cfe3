//! Framed session I/O
//!
//! A [`Session`] wraps one live, authenticated connection. The stream is
//! split into a read half and a write half behind separate locks: one
//! worker blocks on reads while any number of caller tasks send, and a
//! frame is always written and flushed in one piece under the write lock.

use bytes::BytesMut;
use corral_proto::{Frame, FrameCodec, ProtoError};
use corral_trust::Role;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

/// Any stream a session can run over
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionStream for T {}

/// Boxed session stream, in production a client- or server-side TLS stream
pub type BoxedStream = Box<dyn SessionStream>;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("connection truncated mid-frame")]
    Truncated,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// True when the stream is still aligned and the read loop may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::Protocol(e) if e.is_recoverable())
    }
}

struct FrameReader {
    io: ReadHalf<BoxedStream>,
    buf: BytesMut,
}

impl FrameReader {
    async fn read_frame(&mut self) -> Result<Frame, SessionError> {
        loop {
            if let Some(frame) = FrameCodec::decode(&mut self.buf)? {
                return Ok(frame);
            }
            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Err(SessionError::PeerClosed)
                } else {
                    Err(SessionError::Truncated)
                };
            }
        }
    }
}

/// One authenticated, ordered connection between two endpoints
///
/// The peer identity is fixed at construction, after the handshake, and
/// never changes for the life of the session.
pub struct Session {
    peer_uuid: Uuid,
    peer_role: Role,
    reader: Mutex<FrameReader>,
    writer: Mutex<WriteHalf<BoxedStream>>,
}

impl Session {
    /// Wrap a stream whose handshake already completed
    ///
    /// `residual` carries any bytes read past the handshake frames; they are
    /// replayed before new stream data.
    pub fn new(stream: BoxedStream, residual: BytesMut, peer_uuid: Uuid, peer_role: Role) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            peer_uuid,
            peer_role,
            reader: Mutex::new(FrameReader {
                io: read_half,
                buf: residual,
            }),
            writer: Mutex::new(write_half),
        }
    }

    pub fn peer_uuid(&self) -> Uuid {
        self.peer_uuid
    }

    pub fn peer_role(&self) -> Role {
        self.peer_role
    }

    /// Read the next complete frame
    ///
    /// Blocks until one frame is available or the connection fails. The
    /// error distinguishes peer-closed, truncated input, version mismatch,
    /// and recoverable protocol errors (see [`SessionError::is_recoverable`]).
    pub async fn read(&self) -> Result<Frame, SessionError> {
        let mut reader = self.reader.lock().await;
        let frame = reader.read_frame().await?;
        trace!(peer = %self.peer_uuid, %frame, "frame received");
        Ok(frame)
    }

    /// Write and flush one frame atomically
    pub async fn write(&self, frame: &Frame) -> Result<(), SessionError> {
        let encoded = FrameCodec::encode(frame)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        trace!(peer = %self.peer_uuid, %frame, "frame sent");
        Ok(())
    }

    /// Shut down the write side, signalling EOF to the peer
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Write one frame to a raw stream (handshake path, before a session exists)
pub async fn send_frame<S>(io: &mut S, frame: &Frame) -> Result<(), SessionError>
where
    S: AsyncWrite + Unpin,
{
    let encoded = FrameCodec::encode(frame)?;
    io.write_all(&encoded).await?;
    io.flush().await?;
    Ok(())
}

/// Read one frame from a raw stream (handshake path, before a session exists)
///
/// `buf` accumulates stream data across calls; leftover bytes belong to the
/// session and must be handed to [`Session::new`].
pub async fn recv_frame<S>(io: &mut S, buf: &mut BytesMut) -> Result<Frame, SessionError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = FrameCodec::decode(buf)? {
            return Ok(frame);
        }
        let n = io.read_buf(buf).await?;
        if n == 0 {
            return if buf.is_empty() {
                Err(SessionError::PeerClosed)
            } else {
                Err(SessionError::Truncated)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use corral_proto::{CommandOp, FrameKind, StatusOp};
    use std::sync::Arc;
    use std::time::Duration;

    fn session_pair() -> (Session, Session) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = Session::new(Box::new(a), BytesMut::new(), Uuid::new_v4(), Role::AGENT);
        let right = Session::new(Box::new(b), BytesMut::new(), Uuid::new_v4(), Role::SERVER);
        (left, right)
    }

    fn command(payload: &'static [u8]) -> Frame {
        Frame::new(
            FrameKind::Command(CommandOp::Start),
            Uuid::new_v4(),
            Bytes::from_static(payload),
        )
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = session_pair();

        let frame = command(b"instances: 3");
        client.write(&frame).await.unwrap();

        let received = server.read().await.unwrap();
        assert_eq!(received.kind, frame.kind);
        assert_eq!(received.payload, frame.payload);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_send_order() {
        let (client, server) = session_pair();

        for i in 0..32u8 {
            let frame = Frame::new(
                FrameKind::Status(StatusOp::Ready),
                Uuid::new_v4(),
                Bytes::from(vec![i]),
            );
            client.write(&frame).await.unwrap();
        }

        for i in 0..32u8 {
            let frame = server.read().await.unwrap();
            assert_eq!(frame.payload.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_interleave() {
        let (client, server) = session_pair();
        let client = Arc::new(client);

        let mut handles = Vec::new();
        for task in 0..8u8 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..16 {
                    let frame = Frame::new(
                        FrameKind::Command(CommandOp::Stats),
                        Uuid::new_v4(),
                        Bytes::from(vec![task; 512]),
                    );
                    client.write(&frame).await.unwrap();
                }
            }));
        }

        // Every frame must decode cleanly with a uniform payload; torn
        // writes would corrupt the stream or mix payload bytes.
        for _ in 0..(8 * 16) {
            let frame = tokio::time::timeout(Duration::from_secs(5), server.read())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.payload.len(), 512);
            let first = frame.payload[0];
            assert!(frame.payload.iter().all(|&b| b == first));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (client, server) = session_pair();

        client.shutdown().await;
        drop(client);

        assert!(matches!(
            server.read().await,
            Err(SessionError::PeerClosed)
        ));
    }

    #[tokio::test]
    async fn test_recoverable_error_keeps_session_readable() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = Session::new(Box::new(b), BytesMut::new(), Uuid::new_v4(), Role::AGENT);

        // Hand-feed a frame with a clobbered operand, then a good frame
        let bad = command(b"bad");
        let mut encoded = corral_proto::FrameCodec::encode(&bad).unwrap().to_vec();
        encoded[3] = 251;
        let good = command(b"good");
        let good_encoded = corral_proto::FrameCodec::encode(&good).unwrap();

        let mut raw = a;
        raw.write_all(&encoded).await.unwrap();
        raw.write_all(&good_encoded).await.unwrap();
        raw.flush().await.unwrap();

        let err = server.read().await.unwrap_err();
        assert!(err.is_recoverable());

        let next = server.read().await.unwrap();
        assert_eq!(next.payload, good.payload);
    }

    #[tokio::test]
    async fn test_handshake_residual_replayed() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut raw = a;

        let first = command(b"first");
        let second = command(b"second");
        raw.write_all(&corral_proto::FrameCodec::encode(&first).unwrap())
            .await
            .unwrap();
        raw.write_all(&corral_proto::FrameCodec::encode(&second).unwrap())
            .await
            .unwrap();
        raw.flush().await.unwrap();

        // Consume the first frame the way a handshake would, then hand the
        // residual buffer to the session.
        let mut boxed: BoxedStream = Box::new(b);
        let mut buf = BytesMut::new();
        let handshake = recv_frame(&mut boxed, &mut buf).await.unwrap();
        assert_eq!(handshake.payload, first.payload);

        let session = Session::new(boxed, buf, Uuid::new_v4(), Role::AGENT);
        let replayed = session.read().await.unwrap();
        assert_eq!(replayed.payload, second.payload);
    }
}
