//! Client handle and connection state machine

use crate::backoff::{BackoffPolicy, TableBackoff};
use crate::config::ClientConfig;
use crate::identity::UuidRegistry;
use crate::ClientError;
use bytes::{Bytes, BytesMut};
use corral_connection::{
    dispatch, recv_frame, send_frame, Notifier, PeerInfo, Session, SessionError,
};
use corral_proto::{
    CommandOp, ErrorOp, EventOp, Frame, FrameKind, StatusOp, TraceHeader, TraceOptions,
};
use corral_trust::{verify_role, Role};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection state of a client handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Optional collaborators injected into a client
#[derive(Default)]
pub struct ClientOptions {
    /// Shared identity registry; defaults to one backed by the config's
    /// `uuid_store_path` (or an ephemeral one when that is unset)
    pub registry: Option<Arc<UuidRegistry>>,
    /// Reconnection delay policy; defaults to [`TableBackoff`]
    pub backoff: Option<Arc<dyn BackoffPolicy>>,
}

/// Handle used by orchestrator components to talk to the control plane
///
/// Cheap to clone; all clones share one connection and state machine.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    notifier: Arc<dyn Notifier>,
    registry: Arc<UuidRegistry>,
    backoff: Arc<dyn BackoffPolicy>,
    state: StdMutex<ConnectionState>,
    uuid: StdMutex<Option<Uuid>>,
    session: RwLock<Option<Arc<Session>>>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn new(config: ClientConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_options(config, notifier, ClientOptions::default())
    }

    pub fn with_options(
        config: ClientConfig,
        notifier: Arc<dyn Notifier>,
        options: ClientOptions,
    ) -> Self {
        let registry = options.registry.unwrap_or_else(|| {
            Arc::new(match &config.uuid_store_path {
                Some(path) => UuidRegistry::new(path),
                None => UuidRegistry::ephemeral(),
            })
        });
        let backoff = options
            .backoff
            .unwrap_or_else(|| Arc::new(TableBackoff::default()));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ClientInner {
                config,
                notifier,
                registry,
                backoff,
                state: StdMutex::new(ConnectionState::Disconnected),
                uuid: StdMutex::new(None),
                session: RwLock::new(None),
                shutdown,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The persisted identity, available once a dial has started
    pub fn uuid(&self) -> Option<Uuid> {
        *self.inner.uuid.lock().unwrap()
    }

    /// Dial a configured endpoint and start the receive loop
    ///
    /// Tries each endpoint in order and returns the last failure if none
    /// accepts. After a successful dial, connectivity is only reported
    /// through the notifier callbacks; the reconnection machine owns the
    /// session from here on.
    pub async fn dial(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                ConnectionState::Closed => return Err(ClientError::State("client is closed")),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
                _ => return Err(ClientError::State("client is already connected")),
            }
        }

        match self.try_dial().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut state = self.inner.state.lock().unwrap();
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Disconnected;
                }
                Err(e)
            }
        }
    }

    async fn try_dial(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.config.validate()?;

        let uuid = {
            let leased = *inner.uuid.lock().unwrap();
            match leased {
                Some(uuid) => uuid,
                None => {
                    let uuid = inner.registry.lease(inner.config.role)?;
                    *inner.uuid.lock().unwrap() = Some(uuid);
                    uuid
                }
            }
        };

        let mut last_err = ClientError::Configuration("no server endpoints configured".into());
        for target in &inner.config.servers {
            match connect_endpoint(&inner.config, uuid, target).await {
                Ok((session, peer)) => {
                    info!(%uuid, target, peer = %peer.uuid, "control plane session established");
                    {
                        let mut state = inner.state.lock().unwrap();
                        if *state == ConnectionState::Closed {
                            return Err(ClientError::State("client is closed"));
                        }
                        *state = ConnectionState::Connected;
                    }
                    *inner.session.write().await = Some(session.clone());
                    let worker_inner = inner.clone();
                    let handle =
                        tokio::spawn(async move { run_worker(worker_inner, session, peer, uuid).await });
                    *inner.worker.lock().await = Some(handle);
                    return Ok(());
                }
                Err(e) => {
                    debug!(target, error = %e, "dial attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Close the client
    ///
    /// Idempotent; unblocks any pending read or backoff wait and releases
    /// the persisted-UUID lease. Must not be called from inside a notifier
    /// callback, which would wait on itself.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        let _ = self.inner.shutdown.send(true);

        if let Some(session) = self.inner.session.write().await.take() {
            session.shutdown().await;
        }
        if let Some(worker) = self.inner.worker.lock().await.take() {
            let _ = worker.await;
        }

        let uuid = self.inner.uuid.lock().unwrap().take();
        if let Some(uuid) = uuid {
            self.inner.registry.release(self.inner.config.role, uuid);
        }
    }

    pub async fn send_command(
        &self,
        op: CommandOp,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Command(op), payload.into(), None).await
    }

    pub async fn send_status(
        &self,
        op: StatusOp,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Status(op), payload.into(), None).await
    }

    pub async fn send_event(
        &self,
        op: EventOp,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Event(op), payload.into(), None).await
    }

    pub async fn send_error(
        &self,
        op: ErrorOp,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Error(op), payload.into(), None).await
    }

    pub async fn send_traced_command(
        &self,
        op: CommandOp,
        payload: impl Into<Bytes>,
        trace: TraceOptions,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Command(op), payload.into(), Some(trace))
            .await
    }

    pub async fn send_traced_status(
        &self,
        op: StatusOp,
        payload: impl Into<Bytes>,
        trace: TraceOptions,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Status(op), payload.into(), Some(trace))
            .await
    }

    pub async fn send_traced_event(
        &self,
        op: EventOp,
        payload: impl Into<Bytes>,
        trace: TraceOptions,
    ) -> Result<(), ClientError> {
        self.send(FrameKind::Event(op), payload.into(), Some(trace))
            .await
    }

    async fn send(
        &self,
        kind: FrameKind,
        payload: Bytes,
        trace: Option<TraceOptions>,
    ) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Closed {
            return Err(ClientError::State("client is closed"));
        }
        let session = self
            .inner
            .session
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let uuid = self.uuid().ok_or(ClientError::NotConnected)?;

        let mut frame = Frame::new(kind, uuid, payload);
        if let Some(options) = trace {
            frame = frame.with_trace(TraceHeader::from_options(options));
        }

        match session.write(&frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Post-dial transport failures surface through the
                // disconnect callback; the caller only learns the session
                // is gone.
                debug!(error = %e, "send failed, session teardown in progress");
                Err(ClientError::NotConnected)
            }
        }
    }
}

/// Dial one endpoint and run the CONNECT/CONNECTED handshake
async fn connect_endpoint(
    config: &ClientConfig,
    uuid: Uuid,
    target: &str,
) -> Result<(Arc<Session>, PeerInfo), ClientError> {
    let (mut stream, peer_certs) = config
        .tls()
        .connect(config.transport, target, config.server_name.as_deref())
        .await
        .map_err(|e| match e {
            SessionError::Configuration(msg) => ClientError::Configuration(msg),
            other => ClientError::Transport(other),
        })?;

    if config.verify_server_role {
        match verify_role(&peer_certs, Role::SERVER) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ClientError::Handshake(
                    "server certificate does not embed the server role".to_string(),
                ))
            }
            Err(e) => {
                return Err(ClientError::Handshake(format!(
                    "server role verification failed: {e}"
                )))
            }
        }
    }

    let connect =
        Frame::connect(uuid, config.role).map_err(|e| ClientError::Handshake(e.to_string()))?;
    send_frame(&mut stream, &connect).await?;

    let mut residual = BytesMut::new();
    let reply = recv_frame(&mut stream, &mut residual).await?;
    match reply.kind {
        FrameKind::Connected => {
            let payload = reply
                .connect_payload()
                .map_err(|e| ClientError::Handshake(e.to_string()))?;
            let peer = PeerInfo {
                uuid: payload.uuid,
                role: payload.role,
            };
            let session = Arc::new(Session::new(stream, residual, payload.uuid, payload.role));
            Ok((session, peer))
        }
        FrameKind::Error(ErrorOp::ConnectionFailure) => Err(ClientError::Handshake(
            "connection rejected by server".to_string(),
        )),
        other => Err(ClientError::Handshake(format!(
            "unexpected {other} frame during handshake"
        ))),
    }
}

/// Receive loop plus reconnection state machine
async fn run_worker(
    inner: Arc<ClientInner>,
    mut session: Arc<Session>,
    mut peer: PeerInfo,
    uuid: Uuid,
) {
    let mut shutdown = inner.shutdown.subscribe();
    if *shutdown.borrow() {
        return;
    }

    loop {
        inner.notifier.connected(peer).await;

        let failure = loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                result = session.read() => match result {
                    Ok(frame) => dispatch(inner.notifier.as_ref(), frame).await,
                    Err(e) if e.is_recoverable() => {
                        warn!(error = %e, "dropping malformed inbound frame");
                        let reply = Frame::new(
                            FrameKind::Error(ErrorOp::InvalidFrameType),
                            uuid,
                            Bytes::new(),
                        );
                        let _ = session.write(&reply).await;
                    }
                    Err(e) => break e,
                },
            }
        };
        debug!(error = %failure, "control plane session lost");

        *inner.session.write().await = None;
        if !set_state_if_open(&inner, ConnectionState::Reconnecting) {
            return;
        }
        inner.notifier.disconnected(peer).await;

        let (new_session, new_peer) = match reconnect(&inner, &mut shutdown, uuid).await {
            Some(pair) => pair,
            None => return,
        };

        *inner.session.write().await = Some(new_session.clone());
        if !set_state_if_open(&inner, ConnectionState::Connected) {
            return;
        }
        session = new_session;
        peer = new_peer;
        info!(peer = %peer.uuid, "control plane session reestablished");
    }
}

/// Iterate endpoints with backoff until one accepts or the client closes
async fn reconnect(
    inner: &Arc<ClientInner>,
    shutdown: &mut watch::Receiver<bool>,
    uuid: Uuid,
) -> Option<(Arc<Session>, PeerInfo)> {
    let mut attempt: u32 = 0;
    loop {
        for target in &inner.config.servers {
            if *shutdown.borrow() {
                return None;
            }
            attempt += 1;
            match connect_endpoint(&inner.config, uuid, target).await {
                Ok(pair) => return Some(pair),
                Err(e) => debug!(target, attempt, error = %e, "reconnect attempt failed"),
            }

            let delay = inner.backoff.delay(attempt);
            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return None,
            }
        }
    }
}

fn set_state_if_open(inner: &ClientInner, next: ConnectionState) -> bool {
    let mut state = inner.state.lock().unwrap();
    if *state == ConnectionState::Closed {
        return false;
    }
    *state = next;
    true
}
