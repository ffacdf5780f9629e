//! Transport trait definition.
//!
//! Methods return `impl Future + Send` (Edition 2024 RPITIT) so that a
//! session generic over its transport can run on a spawned Tokio task.
//! Implementations may still be written with plain `async fn`.

use std::future::Future;

use poi_core::{DeviceConnectionInfo, Result};
use poi_protocol::DeviceMessage;

/// Link to one terminal.
///
/// Failures of the link itself are reported as `BluetoothConnectivity`
/// errors regardless of the physical medium.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) must be cancel safe: the session polls it inside
/// `tokio::select!` and drops the future whenever another branch wins. A
/// message must never be lost because a `recv` future was dropped.
///
/// # Examples
///
/// ```no_run
/// use poi_hardware::Transport;
/// use poi_protocol::{DeviceMessage, MessageId};
///
/// async fn ping<T: Transport>(transport: &mut T) -> poi_core::Result<bool> {
///     transport.send(DeviceMessage::new(MessageId::Ping)).await?;
///     let reply = transport.recv().await?;
///     Ok(reply.id == MessageId::Ping && reply.is_ok())
/// }
/// ```
pub trait Transport: Send {
    /// Open the link described by `info`.
    ///
    /// # Errors
    ///
    /// Returns `BluetoothConnectivity` if the terminal cannot be reached.
    fn connect(&mut self, info: &DeviceConnectionInfo) -> impl Future<Output = Result<()>> + Send;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the link is closed and
    /// `BluetoothConnectivity` when the write fails.
    fn send(&mut self, message: DeviceMessage) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next inbound message.
    ///
    /// # Errors
    ///
    /// Returns `BluetoothConnectivity` when the link drops or delivers a
    /// frame that cannot be decoded.
    fn recv(&mut self) -> impl Future<Output = Result<DeviceMessage>> + Send;

    /// Close the link. Closing a closed link succeeds.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;
}
