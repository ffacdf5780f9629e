//! Mock transport implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use poi_core::{DeviceConnectionInfo, PoiError, Result};
use poi_protocol::{DeviceMessage, MessageId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::traits::Transport;

type Inbound = Result<DeviceMessage>;

pub const MOCK_MODEL: &str = "iPP350";
pub const MOCK_SERIAL_NUMBER: &str = "MOCK-0001";
pub const MOCK_FIRMWARE: &str = "23.1.0.4";

#[derive(Debug)]
struct MockState {
    auto_replies: HashMap<MessageId, DeviceMessage>,
    refuse_connections: bool,
    fail_sends: bool,
    connect_count: usize,
    last_connection: Option<DeviceConnectionInfo>,
}

impl MockState {
    fn new() -> Self {
        let mut auto_replies = HashMap::new();
        auto_replies.insert(
            MessageId::UnitData,
            DeviceMessage::ok(MessageId::UnitData).with_fields([
                MOCK_MODEL,
                MOCK_SERIAL_NUMBER,
                MOCK_FIRMWARE,
            ]),
        );
        for id in [
            MessageId::HealthStat,
            MessageId::Ping,
            MessageId::Reset,
            MessageId::Print,
            MessageId::PrintBarcode,
        ] {
            auto_replies.insert(id, DeviceMessage::ok(id));
        }

        Self {
            auto_replies,
            refuse_connections: false,
            fail_sends: false,
            connect_count: 0,
            last_connection: None,
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory terminal.
///
/// Out of the box the mock answers `UnitData`, `HealthStat`, `Ping`,
/// `Reset`, `Print` and `PrintBarcode` requests with successful replies.
/// Everything else must be driven from the [`MockTransportHandle`].
///
/// # Examples
///
/// ```
/// use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
/// use poi_hardware::{MockTransport, Transport};
/// use poi_protocol::{DeviceMessage, MessageId};
///
/// #[tokio::main]
/// async fn main() -> poi_core::Result<()> {
///     let (mut transport, handle) = MockTransport::new();
///     transport
///         .connect(&DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("10.0.0.2", 12000)))
///         .await?;
///
///     // Cardholder presses "Yes".
///     handle.emit(DeviceMessage::ok(MessageId::YesNoInput).with_field("Y"));
///
///     let msg = transport.recv().await?;
///     assert_eq!(msg.field(1), Some("Y"));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    sent_tx: mpsc::UnboundedSender<DeviceMessage>,
    state: Arc<Mutex<MockState>>,
    connected: bool,
}

impl MockTransport {
    /// Create a mock transport and the handle that drives it.
    pub fn new() -> (Self, MockTransportHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockState::new()));

        let transport = Self {
            inbound_rx,
            inbound_tx: inbound_tx.clone(),
            sent_tx,
            state: Arc::clone(&state),
            connected: false,
        };
        let handle = MockTransportHandle {
            inbound_tx,
            sent_rx,
            state,
        };

        (transport, handle)
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self, info: &DeviceConnectionInfo) -> Result<()> {
        {
            let mut state = lock(&self.state);
            state.connect_count += 1;
            state.last_connection = Some(info.clone());
            if state.refuse_connections {
                return Err(PoiError::connectivity("connection refused by mock"));
            }
        }

        debug!(device_type = %info.device_type, "mock transport connected");
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, message: DeviceMessage) -> Result<()> {
        if !self.connected {
            return Err(PoiError::not_connected());
        }

        let reply = {
            let state = lock(&self.state);
            if state.fail_sends {
                return Err(PoiError::connectivity("write failed on mock link"));
            }
            state.auto_replies.get(&message.id).cloned()
        };

        // The handle may have been dropped; sends still succeed.
        let _ = self.sent_tx.send(message);
        if let Some(reply) = reply {
            let _ = self.inbound_tx.send(Ok(reply));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<DeviceMessage> {
        if !self.connected {
            return Err(PoiError::not_connected());
        }
        self.inbound_rx
            .recv()
            .await
            .ok_or_else(|| PoiError::connectivity("mock link closed"))?
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            debug!("mock transport disconnected");
        }
        self.connected = false;
        // Replies queued for the old link must not leak into the next one.
        while self.inbound_rx.try_recv().is_ok() {}
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Handle for scripting a [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportHandle {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    sent_rx: mpsc::UnboundedReceiver<DeviceMessage>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransportHandle {
    /// Deliver a message as if the terminal had sent it.
    pub fn emit(&self, message: DeviceMessage) {
        let _ = self.inbound_tx.send(Ok(message));
    }

    /// Make the next `recv` fail as if the link had dropped.
    pub fn fail_link(&self, reason: impl Into<String>) {
        let _ = self.inbound_tx.send(Err(PoiError::connectivity(reason)));
    }

    /// Answer every request with `id` by sending `reply`.
    pub fn set_auto_reply(&self, id: MessageId, reply: DeviceMessage) {
        lock(&self.state).auto_replies.insert(id, reply);
    }

    /// Stop answering requests with `id`.
    pub fn clear_auto_reply(&self, id: MessageId) {
        lock(&self.state).auto_replies.remove(&id);
    }

    /// Enable or disable the automatic heartbeat and ping replies.
    pub fn set_keepalive_replies(&self, enabled: bool) {
        for id in [MessageId::HealthStat, MessageId::Ping] {
            if enabled {
                self.set_auto_reply(id, DeviceMessage::ok(id));
            } else {
                self.clear_auto_reply(id);
            }
        }
    }

    /// Change the identity reported during initialization.
    pub fn set_unit_data(&self, model: &str, serial_number: &str, firmware: &str) {
        self.set_auto_reply(
            MessageId::UnitData,
            DeviceMessage::ok(MessageId::UnitData).with_fields([model, serial_number, firmware]),
        );
    }

    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).refuse_connections = refuse;
    }

    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connect_count
    }

    pub fn last_connection(&self) -> Option<DeviceConnectionInfo> {
        lock(&self.state).last_connection.clone()
    }

    /// Next message sent by the host, skipping heartbeat and ping traffic.
    ///
    /// Returns `None` once the transport has been dropped and every sent
    /// message has been consumed.
    pub async fn next_sent(&mut self) -> Option<DeviceMessage> {
        loop {
            let msg = self.sent_rx.recv().await?;
            if !msg.id.is_keepalive() {
                return Some(msg);
            }
        }
    }

    /// Like [`next_sent`](Self::next_sent) without waiting.
    pub fn try_next_sent(&mut self) -> Option<DeviceMessage> {
        while let Ok(msg) = self.sent_rx.try_recv() {
            if !msg.id.is_keepalive() {
                return Some(msg);
            }
        }
        None
    }

    /// Every message sent so far and not yet consumed, keep-alives included.
    pub fn drain_sent(&mut self) -> Vec<DeviceMessage> {
        let mut sent = Vec::new();
        while let Ok(msg) = self.sent_rx.try_recv() {
            sent.push(msg);
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_core::{ErrorCode, TcpIpConfiguration};

    fn info() -> DeviceConnectionInfo {
        DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("127.0.0.1", 12000))
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (mut transport, _handle) = MockTransport::new();
        let error = transport
            .send(DeviceMessage::new(MessageId::Ping))
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotConnected);
    }

    #[tokio::test]
    async fn test_auto_reply_to_unit_data() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(handle.connect_count(), 1);
        assert_eq!(handle.last_connection(), Some(info()));

        transport
            .send(DeviceMessage::new(MessageId::UnitData))
            .await
            .unwrap();
        let reply = transport.recv().await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.field(1), Some(MOCK_MODEL));
        assert_eq!(reply.field(3), Some(MOCK_FIRMWARE));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let (mut transport, handle) = MockTransport::new();
        handle.refuse_connections(true);

        let error = transport.connect(&info()).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_failed_sends() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();
        handle.fail_sends(true);

        let error = transport
            .send(DeviceMessage::new(MessageId::Print))
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
    }

    #[tokio::test]
    async fn test_fail_link_surfaces_on_recv() {
        let (mut transport, handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();
        handle.fail_link("radio off");

        let error = transport.recv().await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
        assert_eq!(error.description(), "radio off");
    }

    #[tokio::test]
    async fn test_next_sent_skips_keepalive() {
        let (mut transport, mut handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();

        transport.send(DeviceMessage::new(MessageId::Ping)).await.unwrap();
        transport
            .send(DeviceMessage::new(MessageId::HealthStat))
            .await
            .unwrap();
        transport
            .send(DeviceMessage::new(MessageId::SetAmount).with_field("100"))
            .await
            .unwrap();

        let sent = handle.next_sent().await.unwrap();
        assert_eq!(sent.id, MessageId::SetAmount);
        assert!(handle.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn test_keepalive_replies_can_be_disabled() {
        let (mut transport, mut handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();
        handle.set_keepalive_replies(false);

        transport.send(DeviceMessage::new(MessageId::Ping)).await.unwrap();
        handle.emit(DeviceMessage::ok(MessageId::CardRead));

        // The only inbound message is the one emitted by the handle.
        assert_eq!(transport.recv().await.unwrap().id, MessageId::CardRead);
        assert_eq!(handle.drain_sent().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_discards_pending_replies() {
        let (mut transport, _handle) = MockTransport::new();
        transport.connect(&info()).await.unwrap();
        transport.send(DeviceMessage::new(MessageId::Ping)).await.unwrap();

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        transport.disconnect().await.unwrap();

        transport.connect(&info()).await.unwrap();
        transport
            .send(DeviceMessage::new(MessageId::Reset))
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().id, MessageId::Reset);
    }
}
