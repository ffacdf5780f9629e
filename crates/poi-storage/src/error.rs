use poi_core::{ErrorCode, PoiError};
use thiserror::Error;

/// Storage-specific error types for the BIN table store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Operation requires an open table
    #[error("BIN table is not open")]
    NotOpen,

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for PoiError {
    fn from(error: StorageError) -> Self {
        let code = match &error {
            StorageError::Validation(_) => ErrorCode::ParameterIsNil,
            StorageError::NotOpen | StorageError::NotFound { .. } => {
                ErrorCode::ConfigurationReadUnknown
            }
            StorageError::Configuration(_) => ErrorCode::ConfigurationWriteUnknown,
            StorageError::Database(_) | StorageError::Migration(_) => ErrorCode::FileWriteUnknown,
        };
        PoiError::with_description(code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StorageError::NotOpen, ErrorCode::ConfigurationReadUnknown)]
    #[case(StorageError::Validation("pan".into()), ErrorCode::ParameterIsNil)]
    #[case(StorageError::Configuration("path".into()), ErrorCode::ConfigurationWriteUnknown)]
    #[case(
        StorageError::NotFound {
            entity_type: "BinEntry".into(),
            field: "bin_id".into(),
            value: "7".into(),
        },
        ErrorCode::ConfigurationReadUnknown
    )]
    fn test_into_poi_error(#[case] error: StorageError, #[case] expected: ErrorCode) {
        let description = error.to_string();
        let poi: PoiError = error.into();
        assert_eq!(poi.code(), expected);
        assert_eq!(poi.description(), description);
    }
}
