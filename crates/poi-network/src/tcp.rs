//! TCP transport for device message exchange.
//!
//! ```text
//! DeviceSession actor
//!     │
//!     └─> TcpTransport ───(TCP)───> Terminal
//!            │
//!            └─> DeviceCodec (STX/ETX/LRC framing)
//! ```
//!
//! # Timeout Handling
//!
//! Connecting and sending are bounded by the configured timeouts. Receiving
//! is not: the inbound stream waits for as long as the session wants, and
//! the session's own timers decide when an answer is overdue.
//!
//! # Cancel Safety
//!
//! `recv` polls `Framed::next`, which keeps partially received frames in the
//! codec buffer, so dropping a pending `recv` loses no data.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use poi_core::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use poi_core::{DeviceConnectionInfo, ErrorCode, PoiError};
use poi_hardware::Transport;
use poi_protocol::{DeviceCodec, DeviceMessage, ProtocolError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

/// Configuration for [`TcpTransport`].
///
/// # Example
///
/// ```
/// use poi_network::TcpTransportConfig;
/// use std::time::Duration;
///
/// let config = TcpTransportConfig::default().with_io_timeout(Duration::from_secs(2));
/// assert_eq!(config.io_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Timeout for establishing the connection
    pub connect_timeout: Duration,

    /// Timeout for writing one frame
    pub io_timeout: Duration,
}

impl TcpTransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            io_timeout: Duration::from_millis(3000),
        }
    }
}

/// Errors that can occur during TCP transport operations
#[derive(Debug, Error)]
pub enum TcpTransportError {
    /// Transport is not connected
    #[error("Not connected to terminal")]
    NotConnected,

    /// Connection info does not describe an IP-attached terminal
    #[error("Device type {0} is not reachable over TCP/IP")]
    UnsupportedDevice(String),

    /// Address could not be resolved
    #[error("Cannot resolve address {0}")]
    Resolve(String),

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Write operation timed out
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Peer closed the connection
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Framing or message error from DeviceCodec
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TcpTransportError> for PoiError {
    fn from(error: TcpTransportError) -> Self {
        match error {
            TcpTransportError::NotConnected => PoiError::not_connected(),
            TcpTransportError::UnsupportedDevice(_) => {
                PoiError::with_description(ErrorCode::UnsupportedDevice, error.to_string())
            }
            other => PoiError::connectivity(other.to_string()),
        }
    }
}

/// Transport to an IP-attached terminal.
///
/// # Connection Lifecycle
///
/// 1. Create with [`new`](TcpTransport::new)
/// 2. [`connect`](Transport::connect) using the connection info's TCP/IP configuration
/// 3. Exchange messages with [`send`](Transport::send) and [`recv`](Transport::recv)
/// 4. [`disconnect`](Transport::disconnect)
pub struct TcpTransport {
    config: TcpTransportConfig,

    /// Framed TCP stream (None if not connected)
    framed: Option<Framed<TcpStream, DeviceCodec>>,

    peer_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Create a transport. It is not connected after creation.
    ///
    /// ```
    /// use poi_hardware::Transport;
    /// use poi_network::{TcpTransport, TcpTransportConfig};
    ///
    /// let transport = TcpTransport::new(TcpTransportConfig::default());
    /// assert!(!transport.is_connected());
    /// ```
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config,
            framed: None,
            peer_addr: None,
        }
    }

    /// Address of the connected terminal.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Connect to an explicit socket address.
    pub async fn connect_addr(&mut self, addr: SocketAddr) -> Result<(), TcpTransportError> {
        info!("Connecting to terminal at {}", addr);

        let timeout = self.config.connect_timeout;
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                info!("Successfully connected to {}", addr);
                stream
            }
            Ok(Err(e)) => {
                error!("Connection failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Connection timeout after {}ms", timeout.as_millis());
                return Err(TcpTransportError::ConnectionTimeout(
                    timeout.as_millis() as u64
                ));
            }
        };

        // Request/reply exchanges are small; do not wait to coalesce them.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.framed = Some(Framed::new(stream, DeviceCodec::new()));
        self.peer_addr = Some(addr);
        Ok(())
    }

    async fn connect_info(&mut self, info: &DeviceConnectionInfo) -> Result<(), TcpTransportError> {
        if self.framed.is_some() {
            debug!("Already connected, closing previous connection");
            self.close().await;
        }

        let config = info
            .tcp_ip_configuration
            .as_ref()
            .filter(|_| info.device_type.requires_tcp_ip())
            .ok_or_else(|| TcpTransportError::UnsupportedDevice(info.device_type.to_string()))?;

        let target = config.socket_addr();
        let addr = lookup_host(&target)
            .await?
            .next()
            .ok_or_else(|| TcpTransportError::Resolve(target.clone()))?;

        self.connect_addr(addr).await
    }

    async fn send_message(&mut self, message: DeviceMessage) -> Result<(), TcpTransportError> {
        trace!(id = %message.id, field_count = message.fields.len(), "Sending message");

        let timeout = self.config.io_timeout;
        let framed = self.framed.as_mut().ok_or(TcpTransportError::NotConnected)?;

        match tokio::time::timeout(timeout, framed.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send message: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!("Send timeout after {}ms", timeout.as_millis());
                Err(TcpTransportError::WriteTimeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn recv_message(&mut self) -> Result<DeviceMessage, TcpTransportError> {
        let framed = self.framed.as_mut().ok_or(TcpTransportError::NotConnected)?;

        match framed.next().await {
            Some(Ok(message)) => {
                trace!(id = %message.id, field_count = message.fields.len(), "Received message");
                Ok(message)
            }
            Some(Err(e)) => {
                error!("Failed to decode message: {}", e);
                Err(e.into())
            }
            None => {
                warn!("Connection closed by terminal");
                self.framed = None;
                Err(TcpTransportError::ConnectionLost(
                    "Terminal closed connection".to_string(),
                ))
            }
        }
    }

    /// Flush and shut down the socket, bounded so a dead peer cannot hang us.
    async fn close(&mut self) {
        let Some(mut framed) = self.framed.take() else {
            return;
        };
        info!("Closing connection to {:?}", self.peer_addr);

        let close_timeout = Duration::from_millis(500);
        match tokio::time::timeout(close_timeout, framed.flush()).await {
            Ok(Ok(())) => debug!("Flush completed successfully"),
            Ok(Err(e)) => warn!("Error flushing during close: {}", e),
            Err(_) => warn!("Flush timeout during close ({}ms)", close_timeout.as_millis()),
        }

        let mut stream = framed.into_inner();
        match tokio::time::timeout(close_timeout, stream.shutdown()).await {
            Ok(Ok(())) => debug!("Shutdown completed successfully"),
            Ok(Err(e)) => warn!("Error during shutdown: {}", e),
            Err(_) => warn!("Shutdown timeout during close ({}ms)", close_timeout.as_millis()),
        }

        self.peer_addr = None;
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self, info: &DeviceConnectionInfo) -> poi_core::Result<()> {
        Ok(self.connect_info(info).await?)
    }

    async fn send(&mut self, message: DeviceMessage) -> poi_core::Result<()> {
        Ok(self.send_message(message).await?)
    }

    async fn recv(&mut self) -> poi_core::Result<DeviceMessage> {
        Ok(self.recv_message().await?)
    }

    async fn disconnect(&mut self) -> poi_core::Result<()> {
        self.close().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.framed.is_some()
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.framed.is_some())
            .finish()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.framed.is_some() {
            debug!("TcpTransport dropped while connected - connection will be closed");
        }
    }
}
