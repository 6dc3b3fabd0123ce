use thiserror::Error;

/// Errors raised by the pub/sub transport.
///
/// All of them are recoverable: the supervisor logs the status code, waits
/// the reconnect delay and tries again.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No session is open
    #[error("Not connected to broker")]
    NotConnected,

    /// TCP connect or CONNACK did not arrive in time
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Broker answered CONNECT with a non-zero return code
    #[error("Connection refused by broker, return code {0}")]
    ConnectionRefused(u8),

    /// Session dropped after it was established
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Malformed packet on the wire
    #[error("Codec error: {0}")]
    Codec(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Numeric status in the style of embedded MQTT clients.
    ///
    /// Negative values are client-side conditions, positive values are
    /// CONNACK return codes.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::ConnectionTimeout(_) => -4,
            Self::ConnectionLost(_) => -3,
            Self::Io(_) | Self::Codec(_) => -2,
            Self::NotConnected => -1,
            Self::ConnectionRefused(rc) => i32::from(*rc),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransportError::ConnectionTimeout(3000), -4)]
    #[case(TransportError::ConnectionLost("eof".into()), -3)]
    #[case(TransportError::Codec("bad length".into()), -2)]
    #[case(TransportError::NotConnected, -1)]
    #[case(TransportError::ConnectionRefused(5), 5)]
    fn test_status_codes(#[case] error: TransportError, #[case] code: i32) {
        assert_eq!(error.status_code(), code);
    }

    #[test]
    fn test_refused_message() {
        assert_eq!(
            TransportError::ConnectionRefused(2).to_string(),
            "Connection refused by broker, return code 2"
        );
    }
}
