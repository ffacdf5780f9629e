use poi_core::{ErrorCode, PoiError};
use thiserror::Error;

/// Failures while framing, parsing or building device messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("LRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    LrcMismatch { expected: u8, actual: u8 },

    #[error("Unknown message id: {0}")]
    UnknownMessageId(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Field {index} contains control byte {byte:#04x}")]
    InvalidField { index: usize, byte: u8 },

    #[error("Invalid TLV: {0}")]
    InvalidTlv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<ProtocolError> for PoiError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(e) => PoiError::connectivity(e.to_string()),
            other => PoiError::with_description(ErrorCode::Unknown, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_maps_to_connectivity() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: PoiError = ProtocolError::from(io).into();
        assert_eq!(error.code(), ErrorCode::BluetoothConnectivity);
    }

    #[test]
    fn test_protocol_violation_maps_to_unknown() {
        let error: PoiError = ProtocolError::LrcMismatch {
            expected: 0x10,
            actual: 0x11,
        }
        .into();
        assert_eq!(error.code(), ErrorCode::Unknown);
        assert_eq!(error.description(), "LRC mismatch: expected 0x10, got 0x11");
    }
}
