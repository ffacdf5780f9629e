use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Shortest PAN accepted by [`BinEntry::matches`] and `classify`.
pub const MIN_PAN_LENGTH: usize = 12;

/// Longest PAN accepted by [`BinEntry::matches`] and `classify`.
pub const MAX_PAN_LENGTH: usize = 19;

/// Longest BIN prefix that can be stored.
pub const MAX_BIN_LENGTH: usize = 11;

/// One BIN range: card numbers starting with `bin` belong to `network`.
///
/// `pan_length` restricts the match to PANs of exactly that many digits;
/// zero matches any length.
///
/// # Examples
///
/// ```
/// use poi_storage::models::BinEntry;
/// use chrono::Utc;
///
/// let entry = BinEntry {
///     bin_id: 1,
///     bin: "4111".to_string(),
///     bin_length: 4,
///     pan_length: 16,
///     network: "VISA".to_string(),
///     is_debit: false,
///     created_at: Utc::now(),
/// };
///
/// assert!(entry.matches("4111111111111111"));
/// assert!(!entry.matches("411111111111"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BinEntry {
    pub bin_id: i64,

    /// Leading digits of the card number
    pub bin: String,

    /// Number of digits in `bin`, kept for ordering lookups
    pub bin_length: i64,

    /// Exact PAN length for this range, or 0 for any
    pub pan_length: i64,

    /// Card network label, e.g. "VISA"
    pub network: String,

    pub is_debit: bool,

    pub created_at: DateTime<Utc>,
}

impl BinEntry {
    /// Whether `pan` falls inside this range.
    pub fn matches(&self, pan: &str) -> bool {
        pan.starts_with(&self.bin)
            && (self.pan_length == 0 || self.pan_length == pan.len() as i64)
    }
}

/// Values for a new BIN range row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBinEntry {
    pub bin: String,
    pub pan_length: u8,
    pub network: String,
    pub is_debit: bool,
}

impl NewBinEntry {
    pub fn new(bin: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            pan_length: 0,
            network: network.into(),
            is_debit: false,
        }
    }

    pub fn pan_length(mut self, length: u8) -> Self {
        self.pan_length = length;
        self
    }

    pub fn debit(mut self, is_debit: bool) -> Self {
        self.is_debit = is_debit;
        self
    }

    /// Check the row against the table constraints before touching the database.
    pub fn validate(&self) -> StorageResult<()> {
        if self.bin.is_empty() || self.bin.len() > MAX_BIN_LENGTH {
            return Err(StorageError::Validation(format!(
                "bin must have 1 to {MAX_BIN_LENGTH} digits"
            )));
        }
        if !self.bin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StorageError::Validation("bin must be numeric".into()));
        }
        let pan_length = usize::from(self.pan_length);
        if pan_length != 0 && !(MIN_PAN_LENGTH..=MAX_PAN_LENGTH).contains(&pan_length) {
            return Err(StorageError::Validation(format!(
                "pan_length must be 0 or between {MIN_PAN_LENGTH} and {MAX_PAN_LENGTH}"
            )));
        }
        if pan_length != 0 && pan_length <= self.bin.len() {
            return Err(StorageError::Validation(
                "pan_length must exceed the bin length".into(),
            ));
        }
        if self.network.trim().is_empty() {
            return Err(StorageError::Validation("network".into()));
        }
        Ok(())
    }
}

/// Check that `pan` is a plausible card number.
pub fn validate_pan(pan: &str) -> StorageResult<()> {
    if !(MIN_PAN_LENGTH..=MAX_PAN_LENGTH).contains(&pan.len()) {
        return Err(StorageError::Validation(format!(
            "pan must have {MIN_PAN_LENGTH} to {MAX_PAN_LENGTH} digits"
        )));
    }
    if !pan.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::Validation("pan must be numeric".into()));
    }
    Ok(())
}
