use thiserror::Error;

/// Storage-specific error types for the credential store.
///
/// Every variant is non-fatal: the caller logs it and the store keeps its
/// previous logical state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Fewer bytes than requested reached the backend
    #[error("Short write for entry {key}: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        key: String,
        expected: usize,
        written: usize,
    },

    /// The allow-list is full
    #[error("Capacity exceeded: store holds at most {capacity} keys")]
    CapacityExceeded { capacity: usize },

    /// Persisted data does not describe a valid store
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// Backend refused the operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_write_message() {
        let error = StorageError::ShortWrite {
            key: "3".to_string(),
            expected: 16,
            written: 8,
        };
        assert_eq!(
            error.to_string(),
            "Short write for entry 3: expected 16 bytes, wrote 8"
        );
    }

    #[test]
    fn test_capacity_message() {
        let error = StorageError::CapacityExceeded { capacity: 256 };
        assert_eq!(
            error.to_string(),
            "Capacity exceeded: store holds at most 256 keys"
        );
    }
}
