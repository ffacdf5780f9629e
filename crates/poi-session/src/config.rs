//! Session configuration.
//!
//! Every timer, the printer width and the channel capacities are configurable.
//! Values are plain milliseconds so a configuration file stays readable:
//!
//! ```json
//! {
//!   "user_input_timeout_ms": 45000,
//!   "printer_width": 32,
//!   "quick_chip": true
//! }
//! ```
//!
//! Missing keys take their defaults. A zero heartbeat or ping interval
//! disables that keep-alive.

use std::path::Path;
use std::time::Duration;

use poi_core::constants::{
    DEFAULT_COMMAND_CAPACITY, DEFAULT_EVENT_CAPACITY, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_NON_USER_INPUT_TIMEOUT_MS, DEFAULT_PING_INTERVAL_MS, DEFAULT_PRINTER_WIDTH,
    DEFAULT_USER_INPUT_TIMEOUT_MS,
};
use poi_core::{ErrorCode, PoiError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Narrowest printer the receipt layout supports.
pub const MIN_PRINTER_WIDTH: usize = 8;

/// Errors raised while loading a [`SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PoiError {
    fn from(error: ConfigError) -> Self {
        PoiError::with_description(ErrorCode::ConfigurationReadUnknown, error.to_string())
    }
}

/// Configuration for one device session.
///
/// # Example
///
/// ```
/// use poi_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_user_input_timeout(Duration::from_secs(60))
///     .with_quick_chip(true);
///
/// assert_eq!(config.user_input_timeout(), Duration::from_secs(60));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time the customer has to answer a prompt or present a card
    pub user_input_timeout_ms: u64,

    /// Budget for device-internal request/reply exchanges
    pub non_user_input_timeout_ms: u64,

    /// Heartbeat period (0 disables)
    pub heartbeat_interval_ms: u64,

    /// Ping period (0 disables)
    pub ping_interval_ms: u64,

    /// Printer line width in characters
    pub printer_width: usize,

    /// Complete EMV transactions without waiting for the confirmation message
    pub quick_chip: bool,

    /// Capacity of the handle-to-actor command queue
    pub command_capacity: usize,

    /// Capacity of the session event broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_input_timeout_ms: DEFAULT_USER_INPUT_TIMEOUT_MS,
            non_user_input_timeout_ms: DEFAULT_NON_USER_INPUT_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            printer_width: DEFAULT_PRINTER_WIDTH,
            quick_chip: false,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_input_timeout_ms == 0 {
            return Err(ConfigError::Invalid("user_input_timeout_ms must be positive".into()));
        }
        if self.non_user_input_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "non_user_input_timeout_ms must be positive".into(),
            ));
        }
        if self.printer_width < MIN_PRINTER_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "printer_width must be at least {MIN_PRINTER_WIDTH}"
            )));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(ConfigError::Invalid("channel capacities must be positive".into()));
        }
        Ok(())
    }

    pub fn with_user_input_timeout(mut self, timeout: Duration) -> Self {
        self.user_input_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_non_user_input_timeout(mut self, timeout: Duration) -> Self {
        self.non_user_input_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Turn both keep-alives off.
    pub fn without_keepalive(self) -> Self {
        self.with_heartbeat_interval(Duration::ZERO)
            .with_ping_interval(Duration::ZERO)
    }

    pub fn with_printer_width(mut self, width: usize) -> Self {
        self.printer_width = width;
        self
    }

    pub fn with_quick_chip(mut self, enabled: bool) -> Self {
        self.quick_chip = enabled;
        self
    }

    pub fn user_input_timeout(&self) -> Duration {
        Duration::from_millis(self.user_input_timeout_ms)
    }

    pub fn non_user_input_timeout(&self) -> Duration {
        Duration::from_millis(self.non_user_input_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }
}
