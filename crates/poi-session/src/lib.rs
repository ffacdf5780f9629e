//! Device session layer for POI payment terminals.
//!
//! A [`DeviceSession`] owns one terminal: it connects and initializes it,
//! keeps the link alive with heartbeat and ping messages, collects customer
//! input, drives EMV transactions and prints receipts.
//!
//! # Architecture
//!
//! - [`DeviceSession`]: cloneable handle; checks preconditions synchronously
//!   and returns [`Pending`] results
//! - `actor`: single task owning the [`Transport`](poi_hardware::Transport),
//!   timers, input slots and EMV flow
//! - [`timer`], [`input`], [`emv`], [`printer`]: the pieces the actor drives
//!
//! # Example
//!
//! ```
//! use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
//! use poi_hardware::MockTransport;
//! use poi_protocol::{DeviceMessage, MessageId};
//! use poi_session::input::YesNoInputRequest;
//! use poi_session::{DeviceSession, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> poi_core::Result<()> {
//! let (transport, mut terminal) = MockTransport::new();
//! let session = DeviceSession::spawn(transport, SessionConfig::default())?;
//! session
//!     .connect(DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("10.0.0.2", 12000)))?
//!     .await?;
//! terminal.drain_sent();
//!
//! let answer = session.enable_yes_no_input(YesNoInputRequest {
//!     prompt: "Add a tip?".into(),
//! })?;
//! terminal.next_sent().await;
//! terminal.emit(DeviceMessage::ok(MessageId::YesNoInput).with_field("N"));
//! assert!(!answer.await?);
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod config;
pub mod emv;
pub mod input;
mod pending;
pub mod printer;
mod session;
pub mod timer;

pub use config::{ConfigError, SessionConfig};
pub use emv::{
    AuthorizationOutcome, AuthorizationRequest, AuthorizationResponse, EmvState,
    EmvTransactionRequest,
};
pub use input::{
    AlphaInputRequest, CardInputRequest, ChoiceInputRequest, InputKind, NumericInputRequest,
    PinInputRequest, YesNoInputRequest,
};
pub use pending::Pending;
pub use printer::{BarcodeRequest, Column, PrintJob, ReceiptBuilder};
pub use session::{DeviceSession, SessionEvent};
