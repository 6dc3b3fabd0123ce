//! Inbound payload decoding.
//!
//! Each control message decodes into exactly one [`KeyCommand`]. Access keys
//! are carried as 32 hexadecimal characters; `sync-keys` wraps them in a JSON
//! array and is decoded best-effort, element by element.

use latchkey_core::constants::ACCESS_KEY_HEX_LEN;
use latchkey_core::hex::{decode_key, invalid_digit_count};
use latchkey_core::{AccessKey, Error, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::topic::ControlTopic;

/// A decoded store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Replace the whole allow-list.
    Sync(SyncBatch),
    /// Add one key (idempotent).
    Add(AccessKey),
    /// Remove one key.
    Remove(AccessKey),
}

/// Result of decoding a `sync-keys` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncBatch {
    /// Keys that decoded successfully, in payload order.
    pub keys: Vec<AccessKey>,

    /// Number of array elements in the payload.
    pub total: usize,

    /// Number of elements dropped (not a string, or wrong length).
    pub skipped: usize,
}

impl SyncBatch {
    /// `true` when the batch must leave the store untouched.
    ///
    /// An empty array, or one where every element was dropped, never clears
    /// the allow-list.
    pub fn is_noop(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Decode the payload received on `topic`.
///
/// # Errors
///
/// Returns a protocol error (see [`Error::is_protocol_error`]) when the
/// payload cannot be decoded at all. Individual bad elements of a sync batch
/// are not errors; they are counted in [`SyncBatch::skipped`].
pub fn decode_command(topic: ControlTopic, payload: &[u8]) -> Result<KeyCommand> {
    match topic {
        ControlTopic::SyncKeys => decode_sync(payload).map(KeyCommand::Sync),
        ControlTopic::AddKey => decode_single_key(payload).map(KeyCommand::Add),
        ControlTopic::RemoveKey => decode_single_key(payload).map(KeyCommand::Remove),
    }
}

/// Decode an `add-key` / `remove-key` payload: exactly 32 hex characters.
///
/// # Errors
///
/// Returns `Error::InvalidKeyLength` for any other payload length.
pub fn decode_single_key(payload: &[u8]) -> Result<AccessKey> {
    let key = decode_key(payload)?;
    warn_on_lenient_digits(payload);
    Ok(key)
}

/// Decode a `sync-keys` payload: a JSON array of 32-character hex strings.
///
/// # Errors
///
/// Returns `Error::InvalidPayload` if the payload is not valid JSON or is not
/// an array.
pub fn decode_sync(payload: &[u8]) -> Result<SyncBatch> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::InvalidPayload(format!("invalid JSON: {e}")))?;

    let Value::Array(elements) = document else {
        return Err(Error::InvalidPayload(
            "sync payload is not a JSON array".to_string(),
        ));
    };

    let mut batch = SyncBatch {
        keys: Vec::with_capacity(elements.len()),
        total: elements.len(),
        skipped: 0,
    };

    for (index, element) in elements.iter().enumerate() {
        let Some(text) = element.as_str() else {
            debug!(index, "Skipping non-string sync element");
            batch.skipped += 1;
            continue;
        };

        match decode_key(text.as_bytes()) {
            Ok(key) => {
                warn_on_lenient_digits(text.as_bytes());
                batch.keys.push(key);
            }
            Err(e) => {
                debug!(index, len = text.len(), error = %e, "Skipping sync element");
                batch.skipped += 1;
            }
        }
    }

    Ok(batch)
}

fn warn_on_lenient_digits(text: &[u8]) {
    let invalid = invalid_digit_count(text);
    if invalid > 0 {
        warn!(
            invalid,
            expected = ACCESS_KEY_HEX_LEN,
            "Key contains non-hex characters; they decode as zero"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY_A: &str = "000102030405060708090a0b0c0d0e0f";
    const KEY_B: &str = "F0E0D0C0B0A090807060504030201000";

    #[test]
    fn test_decode_add() {
        let command = decode_command(ControlTopic::AddKey, KEY_A.as_bytes()).unwrap();
        assert_eq!(command, KeyCommand::Add(KEY_A.parse().unwrap()));
    }

    #[test]
    fn test_decode_remove() {
        let command = decode_command(ControlTopic::RemoveKey, KEY_B.as_bytes()).unwrap();
        assert_eq!(command, KeyCommand::Remove(KEY_B.parse().unwrap()));
    }

    #[rstest]
    #[case(ControlTopic::AddKey, "")]
    #[case(ControlTopic::AddKey, "000102030405060708090a0b0c0d0e0")]
    #[case(ControlTopic::RemoveKey, "000102030405060708090a0b0c0d0e0f00")]
    fn test_single_key_wrong_length(#[case] topic: ControlTopic, #[case] payload: &str) {
        let error = decode_command(topic, payload.as_bytes()).unwrap_err();
        assert!(matches!(error, Error::InvalidKeyLength { .. }));
        assert!(error.is_protocol_error());
    }

    #[test]
    fn test_single_key_quoted_json_is_rejected() {
        // 34 bytes: the hex form wrapped in quotes is not accepted
        let payload = format!("\"{KEY_A}\"");
        assert!(decode_single_key(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_sync() {
        let payload = format!("[\"{KEY_A}\", \"{KEY_B}\"]");
        let KeyCommand::Sync(batch) =
            decode_command(ControlTopic::SyncKeys, payload.as_bytes()).unwrap()
        else {
            panic!("expected sync command");
        };

        assert_eq!(batch.total, 2);
        assert_eq!(batch.skipped, 0);
        assert_eq!(
            batch.keys,
            vec![KEY_A.parse().unwrap(), KEY_B.parse().unwrap()]
        );
    }

    #[test]
    fn test_decode_sync_skips_bad_elements() {
        let short = &KEY_A[..31];
        let payload = format!("[\"{KEY_A}\", \"{short}\", 42, null]");
        let batch = decode_sync(payload.as_bytes()).unwrap();

        assert_eq!(batch.total, 4);
        assert_eq!(batch.skipped, 3);
        assert_eq!(batch.keys, vec![KEY_A.parse().unwrap()]);
        assert!(!batch.is_noop());
    }

    #[test]
    fn test_decode_sync_empty_array_is_noop() {
        let batch = decode_sync(b"[]").unwrap();
        assert_eq!(batch.total, 0);
        assert!(batch.is_noop());
    }

    #[test]
    fn test_decode_sync_all_invalid_is_noop() {
        let batch = decode_sync(b"[\"abc\", \"\"]").unwrap();
        assert_eq!(batch.skipped, 2);
        assert!(batch.is_noop());
    }

    #[rstest]
    #[case("not json")]
    #[case("{\"keys\": []}")]
    #[case("\"000102030405060708090a0b0c0d0e0f\"")]
    #[case("")]
    fn test_decode_sync_rejects_non_array(#[case] payload: &str) {
        let error = decode_sync(payload.as_bytes()).unwrap_err();
        assert!(matches!(error, Error::InvalidPayload(_)));
    }
}
