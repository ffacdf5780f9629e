//! Shared helpers for session integration tests.
//!
//! Sessions run against a [`MockTransport`]; the returned handle plays the
//! terminal. Tests use a paused Tokio clock, so timeouts elapse as soon as
//! every task is idle.

#![allow(dead_code)]

use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
use poi_hardware::{MockTransport, MockTransportHandle};
use poi_protocol::{DeviceMessage, MessageId};
use poi_session::{DeviceSession, SessionConfig, SessionEvent};
use tokio::sync::broadcast;

pub const TERMINAL_ADDRESS: &str = "10.0.0.2";
pub const TERMINAL_PORT: u16 = 12000;

pub fn connection_info() -> DeviceConnectionInfo {
    DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new(TERMINAL_ADDRESS, TERMINAL_PORT))
        .with_idle_prompt("WELCOME")
}

/// Configuration without heartbeat or ping traffic.
pub fn quiet_config() -> SessionConfig {
    SessionConfig::default().without_keepalive()
}

pub fn spawn(config: SessionConfig) -> (DeviceSession, MockTransportHandle) {
    let (transport, terminal) = MockTransport::new();
    let session = DeviceSession::spawn(transport, config).expect("valid config");
    (session, terminal)
}

/// Spawn, connect and initialize a session. Messages sent during setup are
/// discarded.
pub async fn connected(config: SessionConfig) -> (DeviceSession, MockTransportHandle) {
    let (session, mut terminal) = spawn(config);
    let setup = session
        .connect(connection_info())
        .expect("connect accepted")
        .await
        .expect("connect resolved");
    assert!(setup.did_configure_successfully, "setup failed: {:?}", setup.error);
    assert!(session.is_initialized());
    terminal.drain_sent();
    (session, terminal)
}

/// Wait for the next non-keep-alive message and check its id.
pub async fn expect_sent(terminal: &mut MockTransportHandle, id: MessageId) -> DeviceMessage {
    let message = terminal.next_sent().await.expect("transport alive");
    assert_eq!(message.id, id, "unexpected message {message}");
    message
}

/// Receive events until one matches `predicate`.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = events.recv().await.expect("event stream open");
        if predicate(&event) {
            return event;
        }
    }
}
