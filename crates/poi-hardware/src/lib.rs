//! Transport abstraction for POI terminals.
//!
//! A session never talks to a socket or radio directly. It owns one value
//! implementing [`Transport`], which connects to the terminal described by a
//! [`DeviceConnectionInfo`](poi_core::DeviceConnectionInfo), sends framed
//! [`DeviceMessage`](poi_protocol::DeviceMessage)s and yields the inbound
//! message stream.
//!
//! # Implementations
//!
//! - [`MockTransport`]: scriptable in-memory terminal for tests and demos
//! - `TcpTransport` in the `poi-network` crate: IP-attached terminals
//!
//! # Example
//!
//! ```
//! use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
//! use poi_hardware::{MockTransport, Transport};
//! use poi_protocol::{DeviceMessage, MessageId};
//!
//! #[tokio::main]
//! async fn main() -> poi_core::Result<()> {
//!     let (mut transport, mut handle) = MockTransport::new();
//!     let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("127.0.0.1", 12000));
//!
//!     transport.connect(&info).await?;
//!     transport.send(DeviceMessage::new(MessageId::UnitData)).await?;
//!
//!     let reply = transport.recv().await?;
//!     assert_eq!(reply.id, MessageId::UnitData);
//!     assert_eq!(handle.next_sent().await.map(|m| m.id), Some(MessageId::UnitData));
//!     Ok(())
//! }
//! ```

pub mod mock;
pub mod traits;

pub use mock::{MockTransport, MockTransportHandle};
pub use traits::Transport;
