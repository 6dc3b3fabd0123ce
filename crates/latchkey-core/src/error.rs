use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Wire format errors
    #[error("Invalid key length: expected {expected} characters, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    // Identity errors
    #[error("Invalid device identifier: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid sector key: {0}")]
    InvalidSectorKey(String),

    // State machine errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for errors caused by a malformed inbound message.
    ///
    /// These are dropped and logged by the sync router; processing continues
    /// with the next message.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyLength { .. } | Error::InvalidPayload(_) | Error::UnknownTopic(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
