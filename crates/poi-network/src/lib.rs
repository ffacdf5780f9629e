//! Network transport for IP-attached POI terminals.
//!
//! [`TcpTransport`] implements [`poi_hardware::Transport`] over a TCP socket
//! framed with [`poi_protocol::DeviceCodec`]. [`AnyTransport`] lets callers
//! pick between the TCP transport and the in-memory mock at runtime.
//!
//! # Example
//!
//! ```no_run
//! use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
//! use poi_hardware::Transport;
//! use poi_network::{TcpTransport, TcpTransportConfig};
//!
//! # async fn example() -> poi_core::Result<()> {
//! let mut transport = TcpTransport::new(TcpTransportConfig::default());
//! let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("192.168.0.40", 12000));
//! transport.connect(&info).await?;
//! # Ok(())
//! # }
//! ```

mod any;
mod tcp;

pub use any::AnyTransport;
pub use tcp::{TcpTransport, TcpTransportConfig, TcpTransportError};
