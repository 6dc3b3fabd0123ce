use crate::{
    Result,
    constants::{ACCESS_KEY_LEN, MAX_DEVICE_ID_LEN, SECTOR_KEY_LEN},
    error::Error,
    hex,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Opaque 16-byte secret read verbatim from a credential's data block.
///
/// No internal structure is interpreted. Two keys are equal only if all
/// sixteen bytes match.
///
/// # Security
/// Equality uses constant-time comparison so that a lookup does not leak how
/// many leading bytes of a presented key matched a stored one.
#[derive(Clone, Copy, Eq)]
pub struct AccessKey([u8; ACCESS_KEY_LEN]);

impl AccessKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; ACCESS_KEY_LEN]) -> Self {
        AccessKey(bytes)
    }

    /// Build a key from a slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyLength` if the slice is not 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ACCESS_KEY_LEN] =
            bytes.try_into().map_err(|_| Error::InvalidKeyLength {
                expected: ACCESS_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(AccessKey(bytes))
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ACCESS_KEY_LEN] {
        &self.0
    }

    /// Uppercase 32-character wire form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl PartialEq for AccessKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::hash::Hash for AccessKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AccessKey({})", self.to_hex())
    }
}

impl std::str::FromStr for AccessKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        hex::decode_key(s.trim().as_bytes())
    }
}

/// Device identifier used to derive this endpoint's topics and MQTT client id.
///
/// Must be non-empty, at most 64 characters, and free of whitespace and the
/// MQTT topic metacharacters `/`, `+` and `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a validated device identifier.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the identifier is empty, too long,
    /// or contains a forbidden character.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDeviceId(
                "device identifier must not be empty".to_string(),
            ));
        }

        if id.len() > MAX_DEVICE_ID_LEN {
            return Err(Error::InvalidDeviceId(format!(
                "device identifier must be at most {MAX_DEVICE_ID_LEN} chars, got {}",
                id.len()
            )));
        }

        if let Some(c) = id
            .chars()
            .find(|c| matches!(c, '/' | '+' | '#') || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidDeviceId(format!(
                "device identifier contains forbidden character {c:?}"
            )));
        }

        Ok(DeviceId(id))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Deployment-wide Mifare Classic key A.
///
/// Gates read access to the tag's data sector. It is not a per-user secret and
/// is unrelated to the access keys held in the credential store.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SectorKey([u8; SECTOR_KEY_LEN]);

impl SectorKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; SECTOR_KEY_LEN]) -> Self {
        SectorKey(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SECTOR_KEY_LEN] {
        &self.0
    }
}

impl Default for SectorKey {
    fn default() -> Self {
        SectorKey(crate::constants::DEFAULT_SECTOR_KEY)
    }
}

// Never print the deployment secret.
impl fmt::Debug for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SectorKey(..)")
    }
}

impl std::str::FromStr for SectorKey {
    type Err = Error;

    /// Parse 12 hexadecimal characters. Unlike access keys, every character
    /// must be a valid hex digit.
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().as_bytes();
        if text.len() != SECTOR_KEY_LEN * 2 {
            return Err(Error::InvalidSectorKey(format!(
                "expected {} hex characters, got {}",
                SECTOR_KEY_LEN * 2,
                text.len()
            )));
        }
        if hex::invalid_digit_count(text) > 0 {
            return Err(Error::InvalidSectorKey(
                "sector key must contain only hex digits".to_string(),
            ));
        }

        let mut bytes = [0u8; SECTOR_KEY_LEN];
        for (byte, pair) in bytes.iter_mut().zip(text.chunks_exact(2)) {
            *byte = (hex::nibble(pair[0]) << 4) | hex::nibble(pair[1]);
        }
        Ok(SectorKey(bytes))
    }
}
