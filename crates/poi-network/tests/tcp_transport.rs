//! Integration tests for TcpTransport
//!
//! A fake terminal listens on a loopback port and answers frames through
//! DeviceCodec, so these exercise real socket I/O.

use futures::{SinkExt, StreamExt};
use poi_core::{DeviceConnectionInfo, ErrorCode, TcpIpConfiguration};
use poi_hardware::Transport;
use poi_network::{TcpTransport, TcpTransportConfig};
use poi_protocol::{DeviceCodec, DeviceMessage, MessageId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

fn connection_info(addr: SocketAddr) -> DeviceConnectionInfo {
    DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new(addr.ip().to_string(), addr.port()))
}

fn transport() -> TcpTransport {
    TcpTransport::new(
        TcpTransportConfig::default()
            .with_connect_timeout(Duration::from_millis(1000))
            .with_io_timeout(Duration::from_millis(1000)),
    )
}

/// Fake terminal that answers every request with an OK reply of the same id.
async fn spawn_terminal() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, DeviceCodec::new());

        while let Some(Ok(msg)) = framed.next().await {
            let reply = match msg.id {
                MessageId::UnitData => DeviceMessage::ok(MessageId::UnitData)
                    .with_fields(["iSC250", "SN-42", "11.2.0"]),
                id => DeviceMessage::ok(id),
            };
            if framed.send(reply).await.is_err() {
                break;
            }
        }
    });

    addr
}

#[tokio::test]
async fn test_full_lifecycle_with_fake_terminal() {
    let addr = spawn_terminal().await;
    let mut transport = transport();
    assert!(!transport.is_connected());

    transport.connect(&connection_info(addr)).await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.peer_addr(), Some(addr));

    transport
        .send(DeviceMessage::new(MessageId::UnitData))
        .await
        .unwrap();
    let reply = transport.recv().await.unwrap();

    assert_eq!(reply.id, MessageId::UnitData);
    assert!(reply.is_ok());
    assert_eq!(reply.field(1), Some("iSC250"));

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
    assert_eq!(transport.peer_addr(), None);
}

#[tokio::test]
async fn test_multiple_exchanges_in_order() {
    let addr = spawn_terminal().await;
    let mut transport = transport();
    transport.connect(&connection_info(addr)).await.unwrap();

    for id in [MessageId::HealthStat, MessageId::Ping, MessageId::Print] {
        transport.send(DeviceMessage::new(id)).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().id, id);
    }
}

#[tokio::test]
async fn test_connection_refused_is_connectivity_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = transport();
    let error = transport.connect(&connection_info(addr)).await.unwrap_err();

    assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_peer_close_reports_connection_lost() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut transport = transport();
    transport.connect(&connection_info(addr)).await.unwrap();

    let error = transport.recv().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_pending_recv_can_be_cancelled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, DeviceCodec::new());
        release_rx.await.unwrap();
        framed.send(DeviceMessage::ok(MessageId::Ping)).await.unwrap();
        // Keep the socket open until the client is done.
        let _ = framed.next().await;
    });

    let mut transport = transport();
    transport.connect(&connection_info(addr)).await.unwrap();

    let timed_out = tokio::time::timeout(Duration::from_millis(50), transport.recv()).await;
    assert!(timed_out.is_err());
    assert!(transport.is_connected());

    release_tx.send(()).unwrap();
    let reply = transport.recv().await.unwrap();
    assert_eq!(reply.id, MessageId::Ping);
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let first = spawn_terminal().await;
    let second = spawn_terminal().await;
    let mut transport = transport();

    transport.connect(&connection_info(first)).await.unwrap();
    transport.connect(&connection_info(second)).await.unwrap();
    assert_eq!(transport.peer_addr(), Some(second));

    transport
        .send(DeviceMessage::new(MessageId::Ping))
        .await
        .unwrap();
    assert_eq!(transport.recv().await.unwrap().id, MessageId::Ping);
}
