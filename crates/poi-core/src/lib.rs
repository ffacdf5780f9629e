pub mod constants;
pub mod error;
pub mod financial;
pub mod receipt;
pub mod types;

pub use error::{ErrorCategory, ErrorCode, PoiError, Result};
pub use receipt::{EmvData, ReceiptData};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
