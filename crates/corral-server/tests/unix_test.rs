//! Control plane over a local stream socket
#![cfg(unix)]

mod common;

use common::*;
use corral_client::{Client, ClientConfigBuilder};
use corral_connection::TransportKind;
use corral_proto::{FrameKind, StatusOp};
use corral_server::{ForwardTable, Server};
use corral_trust::Role;

#[tokio::test]
async fn test_unix_socket_session() {
    let cluster = TestCluster::new();
    let socket_path = cluster
        .dir
        .path()
        .join("corral.sock")
        .to_str()
        .expect("socket path")
        .to_string();

    let mut server_config = cluster.server_config(&socket_path);
    server_config.transport = TransportKind::Unix;

    let (server_notifier, mut server_rx) = ChannelNotifier::new();
    let server = Server::serve(server_config, server_notifier, ForwardTable::new())
        .await
        .expect("serve");
    assert!(server.local_addr().is_none());

    // a path is not a TLS server name, so the client pins one explicitly
    let config = ClientConfigBuilder::default()
        .server(&socket_path)
        .transport(TransportKind::Unix)
        .server_name("localhost")
        .role(Role::AGENT)
        .ca_cert_path(&cluster.ca_path)
        .cert_path(cluster.cert_for("agent"))
        .build()
        .expect("config");

    let (client_notifier, mut client_rx) = ChannelNotifier::new();
    let client = Client::new(config, client_notifier);
    client.dial().await.expect("dial");

    match recv_event(&mut client_rx).await {
        TestEvent::Connected(_) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    match recv_event(&mut server_rx).await {
        TestEvent::Connected(peer) => assert_eq!(peer.role, Role::AGENT),
        other => panic!("expected Connected, got {other:?}"),
    }

    client
        .send_status(StatusOp::Ready, &b"node ready"[..])
        .await
        .expect("send");

    match recv_event(&mut server_rx).await {
        TestEvent::Status(frame) => {
            assert_eq!(frame.kind, FrameKind::Status(StatusOp::Ready));
            assert_eq!(frame.payload.as_ref(), b"node ready");
        }
        other => panic!("expected Status, got {other:?}"),
    }

    client.close().await;
    server.stop().await;
}
