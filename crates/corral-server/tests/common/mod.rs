//! Shared fixtures for control-plane integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use corral_certs::generate_ca;
use corral_client::{ClientConfig, Notifier as ClientNotifier};
use corral_proto::Frame;
use corral_server::{PeerInfo, ServerConfig};
use corral_trust::Role;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);
pub const QUIET_TIMEOUT: Duration = Duration::from_millis(300);

/// Route test logs through `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Cert material for one test cluster: a CA plus per-role leaves
pub struct TestCluster {
    pub dir: tempfile::TempDir,
    pub ca_path: PathBuf,
}

impl TestCluster {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let ca = generate_ca("corral integration CA").expect("generate ca");
        let ca_path = dir.path().join("ca.pem");
        ca.save_cert(&ca_path).expect("save ca");

        let sans = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        for (role, name) in [
            (Role::SERVER, "server"),
            (Role::AGENT, "agent"),
            (Role::SCHEDULER, "scheduler"),
            (Role::CONTROLLER, "controller"),
            (Role::NETAGENT, "netagent"),
            (Role::CNCIAGENT, "cnciagent"),
        ] {
            let leaf = ca.issue_role_cert(role, &sans).expect("issue leaf");
            leaf.save_combined(&dir.path().join(format!("{name}.pem")))
                .expect("save leaf");
        }

        Self { dir, ca_path }
    }

    pub fn cert_for(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.pem"))
    }

    pub fn server_config(&self, bind_addr: &str) -> ServerConfig {
        ServerConfig::builder()
            .bind_addr(bind_addr)
            .ca_cert_path(&self.ca_path)
            .cert_path(self.cert_for("server"))
            .build()
            .expect("server config")
    }

    pub fn client_config(&self, server: &str, role: Role, cert_name: &str) -> ClientConfig {
        ClientConfig::builder()
            .server(server)
            .role(role)
            .ca_cert_path(&self.ca_path)
            .cert_path(self.cert_for(cert_name))
            .build()
            .expect("client config")
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("uuids.json")
    }
}

/// Everything a notifier can observe, in arrival order
#[derive(Debug)]
pub enum TestEvent {
    Command(Frame),
    Status(Frame),
    Event(Frame),
    Error(Frame),
    Connected(PeerInfo),
    Disconnected(PeerInfo),
}

/// Notifier that funnels every callback into one channel
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TestEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<TestEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (std::sync::Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ClientNotifier for ChannelNotifier {
    async fn command(&self, frame: Frame) {
        let _ = self.tx.send(TestEvent::Command(frame));
    }
    async fn status(&self, frame: Frame) {
        let _ = self.tx.send(TestEvent::Status(frame));
    }
    async fn event(&self, frame: Frame) {
        let _ = self.tx.send(TestEvent::Event(frame));
    }
    async fn error(&self, frame: Frame) {
        let _ = self.tx.send(TestEvent::Error(frame));
    }
    async fn connected(&self, peer: PeerInfo) {
        let _ = self.tx.send(TestEvent::Connected(peer));
    }
    async fn disconnected(&self, peer: PeerInfo) {
        let _ = self.tx.send(TestEvent::Disconnected(peer));
    }
}

/// Receive the next event or panic after a bounded wait
pub async fn recv_event(rx: &mut mpsc::UnboundedReceiver<TestEvent>) -> TestEvent {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for notifier event")
        .expect("notifier channel closed")
}

/// Assert nothing arrives for a short window
pub async fn expect_quiet(rx: &mut mpsc::UnboundedReceiver<TestEvent>) {
    if let Ok(Some(event)) = tokio::time::timeout(QUIET_TIMEOUT, rx.recv()).await {
        panic!("unexpected notifier event: {event:?}");
    }
}

/// Reserve a local TCP port by briefly binding it
pub fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

/// Slot a programmatic forwarder can read test-assigned UUIDs from
pub type UuidSlot = std::sync::Arc<Mutex<Option<uuid::Uuid>>>;

pub fn uuid_slot() -> UuidSlot {
    std::sync::Arc::new(Mutex::new(None))
}

pub fn set_slot(slot: &UuidSlot, uuid: uuid::Uuid) {
    *slot.lock().unwrap() = Some(uuid);
}
