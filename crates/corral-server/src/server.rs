//! Accept loop, handshake, and frame dispatch

use crate::config::ServerConfig;
use crate::forward::{ForwardDest, ForwardTable};
use crate::ServerError;
use bytes::{Bytes, BytesMut};
use corral_connection::{
    dispatch, recv_frame, send_frame, BoxedStream, Listener, Notifier, PeerInfo, Session,
    SessionError,
};
use corral_proto::{ErrorOp, Frame, FrameKind};
use corral_trust::{verify_role, Role};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct SessionEntry {
    session: Arc<Session>,
    role: Role,
}

/// A running control-plane server
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    uuid: Uuid,
    notifier: Arc<dyn Notifier>,
    rules: ForwardTable,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<JoinSet<()>>,
    accept: Mutex<Option<JoinHandle<()>>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Bind the listener and start accepting sessions
    pub async fn serve(
        config: ServerConfig,
        notifier: Arc<dyn Notifier>,
        rules: ForwardTable,
    ) -> Result<Server, ServerError> {
        config.validate()?;

        let tls = config.tls();
        let acceptor = tls.acceptor().map_err(|e| match e {
            SessionError::Configuration(msg) => ServerError::Configuration(msg),
            other => ServerError::Transport(other),
        })?;

        let listener = config
            .transport
            .bind(&config.bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr();

        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(ServerInner {
            config,
            uuid: Uuid::new_v4(),
            notifier,
            rules,
            sessions: RwLock::new(HashMap::new()),
            shutdown,
            workers: Mutex::new(JoinSet::new()),
            accept: Mutex::new(None),
            local_addr,
        });

        info!(
            uuid = %inner.uuid,
            addr = %inner.config.bind_addr,
            "control plane server listening"
        );

        let accept_inner = inner.clone();
        let handle = tokio::spawn(accept_loop(accept_inner, listener, acceptor));
        *inner.accept.lock().await = Some(handle);

        Ok(Server { inner })
    }

    /// The server's own identity, echoed in CONNECTED replies
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    /// The bound socket address (TCP only)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    /// Identity and role of every live session
    pub async fn sessions(&self) -> Vec<PeerInfo> {
        self.inner
            .sessions
            .read()
            .await
            .iter()
            .map(|(uuid, entry)| PeerInfo {
                uuid: *uuid,
                role: entry.role,
            })
            .collect()
    }

    /// Stop the server
    ///
    /// Stops accepting, disconnects every session (remote clients then run
    /// their own reconnection policy), and returns only after every
    /// per-session worker has exited. Idempotent.
    pub async fn stop(&self) {
        if *self.inner.shutdown.borrow() {
            return;
        }
        let _ = self.inner.shutdown.send(true);

        if let Some(handle) = self.inner.accept.lock().await.take() {
            let _ = handle.await;
        }

        let entries: Vec<SessionEntry> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.session.shutdown().await;
        }

        let mut workers = self.inner.workers.lock().await;
        while workers.join_next().await.is_some() {}
        info!(uuid = %self.inner.uuid, "control plane server stopped");
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: Listener, acceptor: TlsAcceptor) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(raw) => {
                    let conn_inner = inner.clone();
                    let acceptor = acceptor.clone();
                    let mut workers = inner.workers.lock().await;
                    while workers.try_join_next().is_some() {}
                    workers.spawn(handle_connection(conn_inner, raw, acceptor));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
}

async fn handle_connection(inner: Arc<ServerInner>, raw: BoxedStream, acceptor: TlsAcceptor) {
    let tls = inner.config.tls();
    let (mut stream, peer_certs) = match tls.accept(&acceptor, raw).await {
        Ok(accepted) => accepted,
        Err(e) => {
            debug!(error = %e, "TLS accept failed");
            return;
        }
    };

    let mut buf = BytesMut::new();
    let hello = match timeout(HANDSHAKE_TIMEOUT, recv_frame(&mut stream, &mut buf)).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            debug!(error = %e, "handshake read failed");
            return;
        }
        Err(_) => {
            debug!("handshake timed out");
            return;
        }
    };

    let payload = match hello.kind {
        FrameKind::Connect => match hello.connect_payload() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "malformed connect payload");
                reject(&mut stream, inner.uuid).await;
                return;
            }
        },
        other => {
            debug!(kind = %other, "expected CONNECT as first frame");
            reject(&mut stream, inner.uuid).await;
            return;
        }
    };

    if !payload.role.is_valid() {
        debug!(peer = %payload.uuid, "rejecting peer asserting no valid role");
        reject(&mut stream, inner.uuid).await;
        return;
    }

    if let Some(max) = inner.config.max_sessions {
        if inner.sessions.read().await.len() >= max {
            info!(peer = %payload.uuid, max, "rejecting peer: session capacity exceeded");
            reject(&mut stream, inner.uuid).await;
            return;
        }
    }

    if inner.config.verify_peer_role {
        let backed = match verify_role(&peer_certs, payload.role) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(peer = %payload.uuid, error = %e, "role verification failed");
                false
            }
        };
        if !backed {
            info!(
                peer = %payload.uuid,
                role = %payload.role,
                "rejecting peer: certificate does not back asserted role"
            );
            reject(&mut stream, inner.uuid).await;
            return;
        }
    }

    let connected = match Frame::connected(inner.uuid, inner.config.role) {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "cannot encode CONNECTED frame");
            return;
        }
    };
    if let Err(e) = send_frame(&mut stream, &connected).await {
        debug!(peer = %payload.uuid, error = %e, "CONNECTED reply failed");
        return;
    }

    let session = Arc::new(Session::new(stream, buf, payload.uuid, payload.role));
    let peer = PeerInfo {
        uuid: payload.uuid,
        role: payload.role,
    };

    let stale = {
        let mut sessions = inner.sessions.write().await;
        sessions.insert(
            peer.uuid,
            SessionEntry {
                session: session.clone(),
                role: peer.role,
            },
        )
    };
    if let Some(stale) = stale {
        debug!(peer = %peer.uuid, "replacing stale session for reconnected peer");
        stale.session.shutdown().await;
    }

    inner.notifier.connected(peer).await;
    info!(peer = %peer.uuid, role = %peer.role, "peer connected");

    run_session(&inner, &session).await;

    {
        let mut sessions = inner.sessions.write().await;
        if let Some(entry) = sessions.get(&peer.uuid) {
            if Arc::ptr_eq(&entry.session, &session) {
                sessions.remove(&peer.uuid);
            }
        }
    }
    inner.notifier.disconnected(peer).await;
    session.shutdown().await;
    info!(peer = %peer.uuid, "peer disconnected");
}

async fn run_session(inner: &Arc<ServerInner>, session: &Arc<Session>) {
    let mut shutdown = inner.shutdown.subscribe();
    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            result = session.read() => match result {
                Ok(frame) => process_frame(inner, frame).await,
                Err(e) if e.is_recoverable() => {
                    warn!(peer = %session.peer_uuid(), error = %e, "malformed inbound frame");
                    let reply = Frame::new(
                        FrameKind::Error(ErrorOp::InvalidFrameType),
                        inner.uuid,
                        Bytes::new(),
                    );
                    let _ = session.write(&reply).await;
                }
                Err(e) => {
                    debug!(peer = %session.peer_uuid(), error = %e, "session read failed");
                    return;
                }
            },
        }
    }
}

async fn process_frame(inner: &Arc<ServerInner>, frame: Frame) {
    if matches!(frame.kind, FrameKind::Connect | FrameKind::Connected) {
        warn!(%frame, "handshake frame after handshake, dropping");
        return;
    }

    match inner.rules.get(&frame.kind) {
        Some(ForwardDest::Role(role)) => {
            let targets: Vec<(Uuid, Arc<Session>)> = inner
                .sessions
                .read()
                .await
                .iter()
                .filter(|(_, entry)| entry.role.has(*role))
                .map(|(uuid, entry)| (*uuid, entry.session.clone()))
                .collect();
            relay(inner, frame, targets).await;
        }
        Some(ForwardDest::Forwarder(forwarder)) => {
            let recipients = forwarder(&frame);
            let targets: Vec<(Uuid, Arc<Session>)> = {
                let sessions = inner.sessions.read().await;
                recipients
                    .iter()
                    .filter_map(|uuid| {
                        sessions
                            .get(uuid)
                            .map(|entry| (*uuid, entry.session.clone()))
                    })
                    .collect()
            };
            relay(inner, frame, targets).await;
        }
        None => dispatch(inner.notifier.as_ref(), frame).await,
    }
}

/// Relay one frame to its destinations
///
/// The relay stamps path-traced frames once (this server is one hop) and
/// leaves label, payload, and source identity untouched. A destination that
/// died since the snapshot fails silently; there is no redelivery.
async fn relay(inner: &Arc<ServerInner>, frame: Frame, targets: Vec<(Uuid, Arc<Session>)>) {
    if targets.is_empty() {
        debug!(%frame, "no connected destination for frame");
        return;
    }

    let mut out = frame;
    if let Some(trace) = out.trace.as_mut() {
        if trace.path_trace {
            trace.record_hop(inner.uuid);
        }
    }

    for (uuid, session) in targets {
        if let Err(e) = session.write(&out).await {
            debug!(peer = %uuid, error = %e, "relay to dead session failed");
        }
    }
}

async fn reject(stream: &mut BoxedStream, server_uuid: Uuid) {
    let frame = Frame::new(
        FrameKind::Error(ErrorOp::ConnectionFailure),
        server_uuid,
        Bytes::new(),
    );
    let _ = send_frame(stream, &frame).await;
}
