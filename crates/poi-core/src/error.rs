//! Error taxonomy for POI device sessions.
//!
//! Every failure reported by a session is a [`PoiError`]: a numeric
//! [`ErrorCode`] from a closed enumeration plus an optional human-readable
//! description. Codes are grouped by subsystem in decades:
//!
//! | Range | Category |
//! |-------|----------|
//! | 0-9 | Connectivity and initialization |
//! | 20-29 | Configuration and files |
//! | 30-39 | Card input |
//! | 40-49 | Choice input |
//! | 50-59 | Keyboard input |
//! | 60-69 | PIN input |
//! | 70-79 | EMV |
//! | 80-89 | Barcode, device control, firmware |
//! | 100+ | Device token and printer |
//!
//! The numeric values are stable and may be exposed to callers or logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for POI operations.
pub type Result<T> = std::result::Result<T, PoiError>;

/// Closed enumeration of error causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    NotConnected = 1,
    NotInitialized = 2,
    ParameterIsNil = 3,
    ParameterIsNilForMoby = 4,
    CompletionHandlerIsNil = 5,
    CancelledByUser = 6,
    Timeout = 7,

    ConfigurationReadUnknown = 20,
    ConfigurationWriteUnknown = 21,
    ConfigurationWriteUnknownForMoby = 22,
    FileWriteUnknown = 23,
    FileWriteUnknownForMoby = 24,
    UnsupportedDevice = 25,

    CardInputUnknown = 30,
    CardInputTypeNotAccepted = 31,
    CardReadError = 32,
    /// Chip card was swiped and the device now expects the chip.
    WaitingForFallbackChip = 33,
    PleaseSeePhoneForDetails = 34,

    ChoiceInputUnknown = 40,
    ChoiceInputChoicesIsNil = 41,
    ChoiceInputChoicesIsEmpty = 42,

    KeyboardInputUnknown = 50,
    KeyboardInputUnknownPromptId = 51,

    PinInputUnknown = 60,

    EmvUnknown = 70,
    EmvUseMagneticStripe = 71,
    EmvCardBlocked = 72,
    EmvChipError = 73,
    EmvChipReaderError = 74,
    EmvCardNotSupported = 75,
    EmvCardRemoved = 76,
    /// Card declined offline even though an ARQC was received.
    EmvCardDeclinedOfflineWithError = 77,
    EmvChipReaderErrorFallback = 78,
    EmvUnacceptedContactlessMsdDetected = 79,

    BarcodeUnknown = 80,
    BarcodeSetError = 81,
    BarcodeGetError = 82,
    BarcodeInvalidConfigurationValue = 83,
    CancelTransactionOnDeviceFailed = 84,
    BluetoothConnectivity = 85,
    FirmwareUpdateFailed = 86,
    FirmwareUpdateFailedForMoby = 87,

    DeviceTokenRequestError = 100,
    DeviceTokenIsExpired = 101,
    Printer = 102,
    OutOfPaper = 103,
    PrintRequest = 104,
    NoPrinterFound = 105,
    PrintLimitExceeded = 106,
    ProvisioningJsonNotFound = 107,

    Unknown = i32::MAX,
}

/// Subsystem an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connectivity,
    Configuration,
    CardInput,
    ChoiceInput,
    KeyboardInput,
    PinInput,
    Emv,
    Device,
    TokenAndPrinter,
    Unknown,
}

const ALL_CODES: [ErrorCode; 52] = [
    ErrorCode::Success,
    ErrorCode::NotConnected,
    ErrorCode::NotInitialized,
    ErrorCode::ParameterIsNil,
    ErrorCode::ParameterIsNilForMoby,
    ErrorCode::CompletionHandlerIsNil,
    ErrorCode::CancelledByUser,
    ErrorCode::Timeout,
    ErrorCode::ConfigurationReadUnknown,
    ErrorCode::ConfigurationWriteUnknown,
    ErrorCode::ConfigurationWriteUnknownForMoby,
    ErrorCode::FileWriteUnknown,
    ErrorCode::FileWriteUnknownForMoby,
    ErrorCode::UnsupportedDevice,
    ErrorCode::CardInputUnknown,
    ErrorCode::CardInputTypeNotAccepted,
    ErrorCode::CardReadError,
    ErrorCode::WaitingForFallbackChip,
    ErrorCode::PleaseSeePhoneForDetails,
    ErrorCode::ChoiceInputUnknown,
    ErrorCode::ChoiceInputChoicesIsNil,
    ErrorCode::ChoiceInputChoicesIsEmpty,
    ErrorCode::KeyboardInputUnknown,
    ErrorCode::KeyboardInputUnknownPromptId,
    ErrorCode::PinInputUnknown,
    ErrorCode::EmvUnknown,
    ErrorCode::EmvUseMagneticStripe,
    ErrorCode::EmvCardBlocked,
    ErrorCode::EmvChipError,
    ErrorCode::EmvChipReaderError,
    ErrorCode::EmvCardNotSupported,
    ErrorCode::EmvCardRemoved,
    ErrorCode::EmvCardDeclinedOfflineWithError,
    ErrorCode::EmvChipReaderErrorFallback,
    ErrorCode::EmvUnacceptedContactlessMsdDetected,
    ErrorCode::BarcodeUnknown,
    ErrorCode::BarcodeSetError,
    ErrorCode::BarcodeGetError,
    ErrorCode::BarcodeInvalidConfigurationValue,
    ErrorCode::CancelTransactionOnDeviceFailed,
    ErrorCode::BluetoothConnectivity,
    ErrorCode::FirmwareUpdateFailed,
    ErrorCode::FirmwareUpdateFailedForMoby,
    ErrorCode::DeviceTokenRequestError,
    ErrorCode::DeviceTokenIsExpired,
    ErrorCode::Printer,
    ErrorCode::OutOfPaper,
    ErrorCode::PrintRequest,
    ErrorCode::NoPrinterFound,
    ErrorCode::PrintLimitExceeded,
    ErrorCode::ProvisioningJsonNotFound,
    ErrorCode::Unknown,
];

impl ErrorCode {
    /// Numeric value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value.
    ///
    /// # Examples
    ///
    /// ```
    /// use poi_core::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::from_i32(76), Some(ErrorCode::EmvCardRemoved));
    /// assert_eq!(ErrorCode::from_i32(9), None);
    /// ```
    pub fn from_i32(value: i32) -> Option<Self> {
        ALL_CODES.iter().copied().find(|code| code.as_i32() == value)
    }

    /// Subsystem this code belongs to.
    pub fn category(self) -> ErrorCategory {
        match self.as_i32() {
            0..=19 => ErrorCategory::Connectivity,
            20..=29 => ErrorCategory::Configuration,
            30..=39 => ErrorCategory::CardInput,
            40..=49 => ErrorCategory::ChoiceInput,
            50..=59 => ErrorCategory::KeyboardInput,
            60..=69 => ErrorCategory::PinInput,
            70..=79 => ErrorCategory::Emv,
            80..=99 => ErrorCategory::Device,
            100..=199 => ErrorCategory::TokenAndPrinter,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Default human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NotConnected => "Not connected",
            Self::NotInitialized => "Not initialized",
            Self::ParameterIsNil => "Parameter is nil",
            Self::ParameterIsNilForMoby => "Parameter is nil for Moby",
            Self::CompletionHandlerIsNil => "Completion handler is nil",
            Self::CancelledByUser => "Cancelled by user",
            Self::Timeout => "Timeout",
            Self::ConfigurationReadUnknown => "Unknown configuration read error",
            Self::ConfigurationWriteUnknown => "Unknown configuration write error",
            Self::ConfigurationWriteUnknownForMoby => "Unknown configuration write error for Moby",
            Self::FileWriteUnknown => "Unknown file write error",
            Self::FileWriteUnknownForMoby => "Unknown file write error for Moby",
            Self::UnsupportedDevice => "Unsupported device",
            Self::CardInputUnknown => "Unknown card input error",
            Self::CardInputTypeNotAccepted => "Card input type not accepted",
            Self::CardReadError => "Card read error",
            Self::WaitingForFallbackChip => "Waiting for fallback chip",
            Self::PleaseSeePhoneForDetails => "Please see phone for details",
            Self::ChoiceInputUnknown => "Unknown choice input error",
            Self::ChoiceInputChoicesIsNil => "Input choices is nil",
            Self::ChoiceInputChoicesIsEmpty => "Input choices is empty",
            Self::KeyboardInputUnknown => "Unknown keyboard input error",
            Self::KeyboardInputUnknownPromptId => "Unknown keyboard input prompt ID",
            Self::PinInputUnknown => "Unknown PIN input error",
            Self::EmvUnknown => "EMV, unknown error",
            Self::EmvUseMagneticStripe => "EMV, use magnetic stripe",
            Self::EmvCardBlocked => "EMV, card blocked",
            Self::EmvChipError => "EMV, chip error",
            Self::EmvChipReaderError => "EMV, chip reader error",
            Self::EmvCardNotSupported => "EMV, card not supported",
            Self::EmvCardRemoved => "EMV, card removed",
            Self::EmvCardDeclinedOfflineWithError => "EMV, card declined offline with error",
            Self::EmvChipReaderErrorFallback => "EMV, chip reader error fallback",
            Self::EmvUnacceptedContactlessMsdDetected => "EMV, contactless MSD card not accepted",
            Self::BarcodeUnknown => "Unknown barcode error",
            Self::BarcodeSetError => "Barcode set error",
            Self::BarcodeGetError => "Barcode get error",
            Self::BarcodeInvalidConfigurationValue => "Barcode invalid configuration value",
            Self::CancelTransactionOnDeviceFailed => "Call to cancel/reset device failed",
            Self::BluetoothConnectivity => "Bluetooth connectivity error",
            Self::FirmwareUpdateFailed => "Firmware update error",
            Self::FirmwareUpdateFailedForMoby => "Firmware update error for Moby",
            Self::DeviceTokenRequestError => "Device token request error",
            Self::DeviceTokenIsExpired => "Device token is expired",
            Self::Printer => "Printer error",
            Self::OutOfPaper => "Printer out of paper",
            Self::PrintRequest => "Print request error",
            Self::NoPrinterFound => "No printer found",
            Self::PrintLimitExceeded => "Print limit exceeded",
            Self::ProvisioningJsonNotFound => "Provisioning JSON not found",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i32())
    }
}

/// A session failure: error code plus optional description.
///
/// # Examples
///
/// ```
/// use poi_core::{ErrorCode, PoiError};
///
/// let error = PoiError::with_description(ErrorCode::ParameterIsNil, "choices");
/// assert_eq!(error.code(), ErrorCode::ParameterIsNil);
/// assert_eq!(error.to_string(), "ParameterIsNil (3): choices");
///
/// let bare = PoiError::new(ErrorCode::Timeout);
/// assert_eq!(bare.to_string(), "Timeout (7): Timeout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {}", describe(.code, .description))]
pub struct PoiError {
    code: ErrorCode,
    description: Option<String>,
}

fn describe<'a>(code: &ErrorCode, description: &'a Option<String>) -> &'a str {
    description.as_deref().unwrap_or(code.description())
}

impl PoiError {
    /// Create an error carrying only its code.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            description: None,
        }
    }

    /// Create an error with a custom description.
    pub fn with_description(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected)
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::NotInitialized)
    }

    pub fn cancelled_by_user() -> Self {
        Self::new(ErrorCode::CancelledByUser)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout)
    }

    /// Missing or empty required parameter.
    pub fn parameter_is_nil(parameter: impl Into<String>) -> Self {
        Self::with_description(ErrorCode::ParameterIsNil, parameter)
    }

    /// Transport-level failure.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::with_description(ErrorCode::BluetoothConnectivity, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::with_description(ErrorCode::Unknown, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Description, falling back to the code's default text.
    pub fn description(&self) -> &str {
        describe(&self.code, &self.description)
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Whether the error is a precondition failure (reported synchronously).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NotConnected
                | ErrorCode::NotInitialized
                | ErrorCode::ParameterIsNil
                | ErrorCode::ChoiceInputChoicesIsNil
                | ErrorCode::ChoiceInputChoicesIsEmpty
                | ErrorCode::KeyboardInputUnknownPromptId
                | ErrorCode::BarcodeInvalidConfigurationValue
        )
    }
}

impl From<ErrorCode> for PoiError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}
