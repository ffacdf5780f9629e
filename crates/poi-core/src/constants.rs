//! Core constants for POI device sessions.
//!
//! Timeouts, intervals and framing bytes shared by every crate in the
//! workspace. Timeout values are expressed in milliseconds and are the
//! defaults used by `SessionConfig`; a real terminal profile may override
//! each of them.
//!
//! # Frame Structure
//!
//! ```text
//! <STX>ID<FS>FIELD1<FS>FIELD2...<ETX><LRC>
//! ```
//!
//! Where:
//! - `<STX>` - Start of text marker (0x02)
//! - `ID` - Message identifier, e.g. `33.03`
//! - `<FS>` - Field separator (0x1C)
//! - `<ETX>` - End of text marker (0x03)
//! - `<LRC>` - XOR of every byte after STX up to and including ETX
//!
//! # Usage
//!
//! ```
//! use poi_core::constants::*;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_millis(DEFAULT_USER_INPUT_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 30);
//! assert_eq!(FIELD_SEPARATOR, 0x1C);
//! ```

// ============================================================================
// Message Framing
// ============================================================================

/// Start of text marker (STX).
pub const START_BYTE: u8 = 0x02;

/// End of text marker (ETX).
pub const END_BYTE: u8 = 0x03;

/// Field separator (FS) between the message id and each field.
pub const FIELD_SEPARATOR: u8 = 0x1C;

/// Largest accepted frame, markers and LRC included.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Status field value reported by the device for a successful request.
pub const STATUS_OK: &str = "0";

// ============================================================================
// Timers
// ============================================================================

/// Time a customer has to answer a prompt or present a card.
pub const DEFAULT_USER_INPUT_TIMEOUT_MS: u64 = 30_000;

/// Budget for a device-internal request/reply exchange.
///
/// Covers initialization, printing, barcode printing, the authorization
/// confirmation and the device reset issued on cancellation.
pub const DEFAULT_NON_USER_INPUT_TIMEOUT_MS: u64 = 10_000;

/// Interval between heartbeat (health status) requests while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Interval between ping requests while connected.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;

/// Timeout for establishing the transport connection.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Printer
// ============================================================================

/// Character width of the receipt printer.
pub const DEFAULT_PRINTER_WIDTH: usize = 40;

/// Number of blank lines emitted by `forward_receipt` when no count is given.
pub const DEFAULT_FORWARD_LINES: usize = 4;

/// Character used by separator lines.
pub const SEPARATOR_CHAR: char = '-';

/// Character used by amount separator lines.
pub const AMOUNT_SEPARATOR_CHAR: char = '=';

// ============================================================================
// Network
// ============================================================================

/// Default TCP port of an IP-attached terminal.
pub const DEFAULT_DEVICE_PORT: u16 = 12000;

// ============================================================================
// Session
// ============================================================================

/// Capacity of the command queue between session handles and the actor.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Capacity of the session event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Number of EMV state transitions retained for diagnostics.
pub const MAX_EMV_HISTORY: usize = 100;
