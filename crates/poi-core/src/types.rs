use crate::{
    Result,
    error::{ErrorCode, PoiError},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};
use subtle::ConstantTimeEq;

/// Kind of terminal a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Ingenico RBA terminal paired over Bluetooth.
    RbaBluetooth,
    /// Ingenico RBA terminal reachable over TCP/IP.
    RbaTcpIp,
    /// Moby card reader paired over Bluetooth.
    MobyBluetooth,
}

impl DeviceType {
    /// Whether a Bluetooth identifier is required to reach the device.
    #[must_use]
    pub fn requires_identifier(self) -> bool {
        matches!(self, Self::RbaBluetooth | Self::MobyBluetooth)
    }

    /// Whether a TCP/IP configuration is required to reach the device.
    #[must_use]
    pub fn requires_tcp_ip(self) -> bool {
        matches!(self, Self::RbaTcpIp)
    }

    /// Whether the device belongs to the Moby family.
    ///
    /// Moby devices report parameter and configuration failures with their
    /// own error codes.
    #[must_use]
    pub fn is_moby(self) -> bool {
        matches!(self, Self::MobyBluetooth)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::RbaBluetooth => "RBA (Bluetooth)",
            Self::RbaTcpIp => "RBA (TCP/IP)",
            Self::MobyBluetooth => "Moby (Bluetooth)",
        };
        f.write_str(name)
    }
}

/// Address of an IP-attached terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpIpConfiguration {
    pub ip_address: String,
    pub port: u16,
}

impl TcpIpConfiguration {
    pub fn new(ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
        }
    }

    /// `host:port` form suitable for socket address resolution.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

/// Everything needed to reach and configure one terminal.
///
/// # Examples
///
/// ```
/// use poi_core::{DeviceConnectionInfo, ErrorCode, TcpIpConfiguration};
///
/// let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("10.0.0.7", 12000))
///     .with_idle_prompt("Welcome");
/// assert!(info.validate_configuration().is_ok());
///
/// let mut broken = info.clone();
/// broken.tcp_ip_configuration = None;
/// let error = broken.validate_configuration().unwrap_err();
/// assert_eq!(error.code(), ErrorCode::ParameterIsNil);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnectionInfo {
    pub device_type: DeviceType,
    /// Bluetooth identifier of the device.
    pub identifier: Option<String>,
    pub tcp_ip_configuration: Option<TcpIpConfiguration>,
    pub device_description: Option<String>,
    /// Text shown on the terminal when idle.
    pub idle_prompt: Option<String>,
    /// Image shown on the terminal when idle, in place of the prompt.
    pub idle_image_name: Option<String>,
}

impl DeviceConnectionInfo {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            identifier: None,
            tcp_ip_configuration: None,
            device_description: None,
            idle_prompt: None,
            idle_image_name: None,
        }
    }

    /// Connection info for an RBA terminal over TCP/IP.
    pub fn tcp_ip(configuration: TcpIpConfiguration) -> Self {
        Self::new(DeviceType::RbaTcpIp).with_tcp_ip_configuration(configuration)
    }

    /// Connection info for a Bluetooth terminal.
    pub fn bluetooth(device_type: DeviceType, identifier: impl Into<String>) -> Self {
        Self::new(device_type).with_identifier(identifier)
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_tcp_ip_configuration(mut self, configuration: TcpIpConfiguration) -> Self {
        self.tcp_ip_configuration = Some(configuration);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.device_description = Some(description.into());
        self
    }

    pub fn with_idle_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.idle_prompt = Some(prompt.into());
        self
    }

    pub fn with_idle_image_name(mut self, name: impl Into<String>) -> Self {
        self.idle_image_name = Some(name.into());
        self
    }

    /// Check that every field the device type requires is present.
    ///
    /// Only presence is verified; addresses are not resolved.
    ///
    /// # Errors
    ///
    /// Returns `ParameterIsNil` (or `ParameterIsNilForMoby` for Moby
    /// devices) with a description naming the missing field.
    pub fn validate_configuration(&self) -> Result<()> {
        let missing = |field: &str| {
            let code = if self.device_type.is_moby() {
                ErrorCode::ParameterIsNilForMoby
            } else {
                ErrorCode::ParameterIsNil
            };
            PoiError::with_description(code, field)
        };

        if self.device_type.requires_identifier() && is_blank(self.identifier.as_deref()) {
            return Err(missing("identifier"));
        }

        if self.device_type.requires_tcp_ip() {
            let config = self
                .tcp_ip_configuration
                .as_ref()
                .ok_or_else(|| missing("tcp_ip_configuration"))?;
            if config.ip_address.trim().is_empty() {
                return Err(missing("tcp_ip_configuration.ip_address"));
            }
            if config.port == 0 {
                return Err(missing("tcp_ip_configuration.port"));
            }
        }

        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Dotted firmware or application version: `major.minor.micro.build`.
///
/// Missing trailing components are treated as zero, so `"23.1"` equals
/// `"23.1.0.0"`.
///
/// # Examples
///
/// ```
/// use poi_core::VersionNumber;
///
/// let old: VersionNumber = "23.0.14".parse().unwrap();
/// let new: VersionNumber = "23.1".parse().unwrap();
/// assert!(old < new);
/// assert_eq!(new.to_string(), "23.1.0.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub build: u32,
}

impl VersionNumber {
    pub fn new(major: u32, minor: u32, micro: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            build,
        }
    }

    fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.micro, self.build)
    }
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_tuple().cmp(&other.as_tuple())
    }
}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for VersionNumber {
    type Err = PoiError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            PoiError::with_description(
                ErrorCode::ConfigurationReadUnknown,
                format!("Invalid version number: {s}"),
            )
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for component in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = component.parse().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.micro, self.build
        )
    }
}

/// Identity reported by the terminal during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial_number: String,
    pub firmware: VersionNumber,
}

/// Outcome of one connection attempt.
///
/// Created once per attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSetupResult {
    pub connection_info: DeviceConnectionInfo,
    pub did_configure_successfully: bool,
    pub error: Option<PoiError>,
    pub device_info: Option<DeviceInfo>,
}

impl DeviceSetupResult {
    pub fn success(connection_info: DeviceConnectionInfo, device_info: DeviceInfo) -> Self {
        Self {
            connection_info,
            did_configure_successfully: true,
            error: None,
            device_info: Some(device_info),
        }
    }

    pub fn failure(connection_info: DeviceConnectionInfo, error: PoiError) -> Self {
        Self {
            connection_info,
            did_configure_successfully: false,
            error: Some(error),
            device_info: None,
        }
    }
}

/// Non-negative money value in minor units (cents).
///
/// # Examples
///
/// ```
/// use poi_core::Amount;
///
/// let amount = Amount::from_cents(1234);
/// assert_eq!(amount.to_string(), "12.34");
/// assert_eq!("0.05".parse::<Amount>().unwrap(), Amount::from_cents(5));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two amounts, `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = PoiError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PoiError::with_description(ErrorCode::Unknown, format!("Invalid amount: {s}"));

        let (whole, fraction) = match s.trim().split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s.trim(), ""),
        };
        if whole.is_empty() || fraction.len() > 2 {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let fraction: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

/// Tender the transaction is paid with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Credit,
    Debit,
    Ebt,
    Gift,
}

impl PaymentType {
    /// Wire code used by the set-payment-type message.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Debit => "A",
            Self::Credit => "B",
            Self::Ebt => "C",
            Self::Gift => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Self::Debit),
            "B" => Some(Self::Credit),
            "C" => Some(Self::Ebt),
            "D" => Some(Self::Gift),
            _ => None,
        }
    }
}

/// Account selected for a debit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum DebitAccountType {
    #[default]
    None = -1,
    Checking = 0,
    Savings = 1,
}

/// Language the cardholder chose on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceLanguage {
    #[default]
    English,
    French,
}

/// How card data was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    Swiped,
    Inserted,
    Tapped,
    Keyed,
}

impl EntryMode {
    /// Parse the single-letter entry code the device reports.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::Swiped),
            "C" => Some(Self::Inserted),
            "T" => Some(Self::Tapped),
            "M" => Some(Self::Keyed),
            _ => None,
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Swiped => "Swiped",
            Self::Inserted => "Chip",
            Self::Tapped => "Contactless",
            Self::Keyed => "Keyed",
        };
        f.write_str(name)
    }
}

/// Encrypted PIN block with its key serial number.
///
/// # Security
/// Comparison is constant-time and `Debug` never prints the block.
#[derive(Clone, Eq, Serialize, Deserialize)]
pub struct PinBlock {
    block: String,
    key_serial_number: String,
}

impl PinBlock {
    pub fn new(block: impl Into<String>, key_serial_number: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            key_serial_number: key_serial_number.into(),
        }
    }

    pub fn block(&self) -> &str {
        &self.block
    }

    pub fn key_serial_number(&self) -> &str {
        &self.key_serial_number
    }
}

impl PartialEq for PinBlock {
    fn eq(&self, other: &Self) -> bool {
        let block: bool = self.block.as_bytes().ct_eq(other.block.as_bytes()).into();
        let ksn: bool = self
            .key_serial_number
            .as_bytes()
            .ct_eq(other.key_serial_number.as_bytes())
            .into();
        block & ksn
    }
}

impl fmt::Debug for PinBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PinBlock")
            .field("block", &"<redacted>")
            .field("key_serial_number", &self.key_serial_number)
            .finish()
    }
}

/// Card data captured by the card collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub entry_mode: EntryMode,
    /// Masked account number, e.g. `************1234`.
    pub masked_pan: String,
    pub cardholder_name: Option<String>,
    /// Expiration as `YYMM`.
    pub expiration: Option<String>,
    pub encrypted_track: Option<String>,
}

impl CardData {
    /// Mask all but the last four digits of a PAN.
    ///
    /// # Examples
    ///
    /// ```
    /// use poi_core::CardData;
    ///
    /// assert_eq!(CardData::mask_pan("4111111111111111"), "************1111");
    /// assert_eq!(CardData::mask_pan("123"), "123");
    /// ```
    #[must_use]
    pub fn mask_pan(pan: &str) -> String {
        let len = pan.chars().count();
        if len <= 4 {
            return pan.to_string();
        }
        let visible: String = pan.chars().skip(len - 4).collect();
        format!("{}{}", "*".repeat(len - 4), visible)
    }
}

/// Prompt identifiers accepted by the alpha keyboard collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardPromptId {
    PostalCode,
}

impl KeyboardPromptId {
    /// Resolve a raw prompt id.
    ///
    /// # Errors
    /// Returns `KeyboardInputUnknownPromptId` for ids outside the known range.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::PostalCode),
            other => Err(PoiError::with_description(
                ErrorCode::KeyboardInputUnknownPromptId,
                format!("Unknown prompt id: {other}"),
            )),
        }
    }

    /// Prompt index on the device form.
    #[must_use]
    pub fn device_prompt(self) -> &'static str {
        match self {
            Self::PostalCode => "POSTAL",
        }
    }
}
