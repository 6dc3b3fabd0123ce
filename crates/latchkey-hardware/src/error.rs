//! Error types for hardware operations.
//!
//! Covers the failure modes of the credential reader driver: the reader
//! missing at boot, a tag leaving the field mid-cycle, a rejected sector key
//! and unreadable blocks.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// No target, or a different target than the one addressed, is in the field.
    #[error("Target not present: {message}")]
    TargetNotPresent { message: String },

    /// The sector key was rejected for the given block.
    #[error("Authentication failed for block {block}")]
    AuthenticationFailed { block: u8 },

    /// Block read error.
    #[error("Card read error: {message}")]
    CardReadError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new target-not-present error.
    pub fn target_not_present(message: impl Into<String>) -> Self {
        Self::TargetNotPresent {
            message: message.into(),
        }
    }

    /// Create a new authentication error.
    pub fn authentication_failed(block: u8) -> Self {
        Self::AuthenticationFailed { block }
    }

    /// Create a new card read error.
    pub fn card_read(message: impl Into<String>) -> Self {
        Self::CardReadError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Returns `true` if the reader itself is unusable.
    ///
    /// Per-cycle failures (authentication, read, target gone) are not fatal;
    /// the authentication loop denies the attempt and polls again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::InitializationFailed { .. } | Self::Io(_)
        )
    }
}
