//! Enum wrapper for transport dispatch.
//!
//! [`Transport`] methods return `impl Future`, so the trait cannot be used
//! as `dyn Transport`. `AnyTransport` gives callers that choose the
//! transport at runtime (such as the diagnostics CLI) a single concrete type.

use poi_core::{DeviceConnectionInfo, Result};
use poi_hardware::{MockTransport, Transport};
use poi_protocol::DeviceMessage;

use crate::TcpTransport;

/// Transport chosen at runtime.
///
/// # Examples
///
/// ```
/// use poi_hardware::{MockTransport, Transport};
/// use poi_network::AnyTransport;
///
/// let (mock, _handle) = MockTransport::new();
/// let transport = AnyTransport::Mock(mock);
/// assert!(!transport.is_connected());
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// In-memory terminal for development and testing.
    Mock(MockTransport),
    /// IP-attached terminal.
    Tcp(TcpTransport),
}

impl Transport for AnyTransport {
    async fn connect(&mut self, info: &DeviceConnectionInfo) -> Result<()> {
        match self {
            Self::Mock(transport) => transport.connect(info).await,
            Self::Tcp(transport) => transport.connect(info).await,
        }
    }

    async fn send(&mut self, message: DeviceMessage) -> Result<()> {
        match self {
            Self::Mock(transport) => transport.send(message).await,
            Self::Tcp(transport) => transport.send(message).await,
        }
    }

    async fn recv(&mut self) -> Result<DeviceMessage> {
        match self {
            Self::Mock(transport) => transport.recv().await,
            Self::Tcp(transport) => transport.recv().await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Mock(transport) => transport.disconnect().await,
            Self::Tcp(transport) => transport.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Mock(transport) => transport.is_connected(),
            Self::Tcp(transport) => transport.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_core::TcpIpConfiguration;
    use poi_protocol::MessageId;

    #[tokio::test]
    async fn test_mock_dispatch() {
        let (mock, _handle) = MockTransport::new();
        let mut transport = AnyTransport::Mock(mock);
        let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("127.0.0.1", 1));

        transport.connect(&info).await.unwrap();
        assert!(transport.is_connected());

        transport
            .send(DeviceMessage::new(MessageId::Ping))
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().id, MessageId::Ping);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}
