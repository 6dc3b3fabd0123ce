//! Types shared by the reader and actuator implementations.

use latchkey_core::constants::SUPPORTED_UID_LEN;
use latchkey_core::hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reader information returned by [`CredentialReader::open`].
///
/// [`CredentialReader::open`]: crate::traits::CredentialReader::open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "PN532").
    pub name: String,

    /// List of supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            protocols,
            firmware_version: None,
        }
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

/// Identifier (UID) of a passive target in the reader's field.
///
/// Length varies with the tag family: 4 bytes for Mifare Classic, 7 or 10
/// for others. Only 4-byte identifiers are accepted by the authentication
/// loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId(Vec<u8>);

impl TargetId {
    pub fn new(uid: impl Into<Vec<u8>>) -> Self {
        Self(uid.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` for identifiers of the supported tag family.
    pub fn is_supported(&self) -> bool {
        self.0.len() == SUPPORTED_UID_LEN
    }

    /// UID as uppercase hex, e.g. `"04ABCDEF"`.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_target_id_hex() {
        let target = TargetId::new(vec![0x04, 0xAB, 0xCD, 0xEF]);
        assert_eq!(target.to_hex(), "04ABCDEF");
        assert_eq!(target.to_string(), "04ABCDEF");
        assert_eq!(target.len(), 4);
        assert!(target.is_supported());
    }

    #[rstest]
    #[case::four_bytes(4, true)]
    #[case::seven_bytes(7, false)]
    #[case::ten_bytes(10, false)]
    #[case::empty(0, false)]
    fn test_target_id_supported_lengths(#[case] len: usize, #[case] supported: bool) {
        let target = TargetId::new(vec![0x04; len]);
        assert_eq!(target.is_supported(), supported);
        assert_eq!(target.is_empty(), len == 0);
    }

    #[test]
    fn test_reader_info_serialization() {
        let info = ReaderInfo::new("PN532", vec!["ISO14443A".to_string()])
            .with_firmware_version("1.6");
        let json = serde_json::to_string(&info).unwrap();
        let back: ReaderInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
