//! Hexadecimal wire form of access keys.
//!
//! Every access key travels as 32 hexadecimal characters, two per byte, most
//! significant nibble first. Decoding is case-insensitive and lenient: a
//! character outside `0-9`, `a-f`, `A-F` decodes as a zero nibble instead of
//! failing. Only the length is enforced. Callers that want to report the
//! lenient case use [`invalid_digit_count`].

use crate::constants::{ACCESS_KEY_HEX_LEN, ACCESS_KEY_LEN};
use crate::error::{Error, Result};
use crate::types::AccessKey;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Convert one ASCII hex digit to its nibble value, mapping anything else to 0.
#[inline]
pub fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

/// Encode arbitrary bytes as uppercase hex.
///
/// ```
/// use latchkey_core::hex::encode;
///
/// assert_eq!(encode(&[0x04, 0xAB, 0xCD, 0xEF]), "04ABCDEF");
/// ```
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }
    out
}

/// Decode the 32-character wire form of an access key.
///
/// # Errors
///
/// Returns [`Error::InvalidKeyLength`] if `text` is not exactly
/// [`ACCESS_KEY_HEX_LEN`] bytes long.
///
/// ```
/// use latchkey_core::hex::decode_key;
///
/// let key = decode_key(b"000102030405060708090a0b0c0d0e0f").unwrap();
/// assert_eq!(key.as_bytes()[15], 0x0F);
/// assert!(decode_key(b"0001").is_err());
/// ```
pub fn decode_key(text: &[u8]) -> Result<AccessKey> {
    if text.len() != ACCESS_KEY_HEX_LEN {
        return Err(Error::InvalidKeyLength {
            expected: ACCESS_KEY_HEX_LEN,
            actual: text.len(),
        });
    }

    let mut bytes = [0u8; ACCESS_KEY_LEN];
    for (byte, pair) in bytes.iter_mut().zip(text.chunks_exact(2)) {
        *byte = (nibble(pair[0]) << 4) | nibble(pair[1]);
    }
    Ok(AccessKey::new(bytes))
}

/// Number of characters in `text` that are not hex digits.
pub fn invalid_digit_count(text: &[u8]) -> usize {
    text.iter().filter(|c| !c.is_ascii_hexdigit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(b'0', 0)]
    #[case(b'9', 9)]
    #[case(b'a', 10)]
    #[case(b'F', 15)]
    #[case(b'g', 0)]
    #[case(b' ', 0)]
    fn test_nibble(#[case] input: u8, #[case] expected: u8) {
        assert_eq!(nibble(input), expected);
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        let lower = decode_key(b"deadbeefdeadbeefdeadbeefdeadbeef").unwrap();
        let upper = decode_key(b"DEADBEEFDEADBEEFDEADBEEFDEADBEEF").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_bytes()[0], 0xDE);
    }

    #[test]
    fn test_non_hex_decodes_as_zero() {
        let key = decode_key(b"zz0102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[1], 0x01);
        assert_eq!(invalid_digit_count(b"zz0102030405060708090a0b0c0d0e0f"), 2);
    }

    #[rstest]
    #[case(0)]
    #[case(31)]
    #[case(33)]
    #[case(64)]
    fn test_wrong_length_rejected(#[case] len: usize) {
        let text = vec![b'a'; len];
        let result = decode_key(&text);
        assert_eq!(
            result,
            Err(Error::InvalidKeyLength {
                expected: 32,
                actual: len
            })
        );
    }

    proptest! {
        #[test]
        fn prop_hex_roundtrip(bytes in any::<[u8; 16]>()) {
            let key = AccessKey::new(bytes);
            let encoded = encode(key.as_bytes());
            prop_assert_eq!(encoded.len(), ACCESS_KEY_HEX_LEN);
            prop_assert_eq!(decode_key(encoded.as_bytes()).unwrap(), key);
            prop_assert_eq!(decode_key(encoded.to_lowercase().as_bytes()).unwrap(), key);
        }
    }
}
