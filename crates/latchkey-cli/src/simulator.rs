//! Stdin tag simulator.
//!
//! Each line presents one tag to the mock reader:
//!
//! ```text
//! <uid-hex> <block-hex> [<secret-hex>]
//! ```
//!
//! `uid-hex` is the credential ID (4 bytes for a supported tag), `block-hex`
//! the 32 hex characters stored in the configured data block. The sector is
//! protected with the configured secret unless a different one is given,
//! which simulates a foreign card.

use latchkey_core::hex::{decode_key, invalid_digit_count, nibble};
use latchkey_core::{Error, Result, SectorKey};
use latchkey_hardware::mock::{MockReaderHandle, SimulatedTag};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Parse one simulator line.
pub fn parse_tag_line(line: &str, block: u8, secret: SectorKey) -> Result<SimulatedTag> {
    let mut fields = line.split_whitespace();
    let (Some(uid), Some(data)) = (fields.next(), fields.next()) else {
        return Err(Error::InvalidPayload(
            "expected '<uid-hex> <block-hex>'".to_string(),
        ));
    };

    let uid = parse_uid(uid)?;

    if invalid_digit_count(data.as_bytes()) > 0 {
        return Err(Error::InvalidPayload(format!("block '{data}' is not hex")));
    }
    let data = decode_key(data.as_bytes())?;

    let secret = match fields.next() {
        Some(text) => text.parse()?,
        None => secret,
    };

    if fields.next().is_some() {
        return Err(Error::InvalidPayload("trailing fields".to_string()));
    }

    Ok(SimulatedTag::new(uid)
        .with_sector_key(secret)
        .with_block(block, *data.as_bytes()))
}

fn parse_uid(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() % 2 != 0 || invalid_digit_count(bytes) > 0 {
        return Err(Error::InvalidPayload(format!(
            "uid '{text}' must be an even number of hex digits"
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect())
}

/// Present a tag for every valid stdin line until stdin closes.
pub async fn feed_stdin(handle: MockReaderHandle, block: u8, secret: SectorKey) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Tag simulator ready: enter '<uid-hex> <block-hex>'");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_tag_line(&line, block, secret) {
            Ok(tag) => {
                if handle.present(tag).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring simulator line"),
        }
    }

    info!("Tag simulator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_hardware::mock::MockReader;
    use latchkey_hardware::CredentialReader;
    use rstest::rstest;

    #[tokio::test]
    async fn test_parsed_tag_reads_back() {
        let tag = parse_tag_line(
            "DEADBEEF 000102030405060708090a0b0c0d0e0f",
            4,
            SectorKey::default(),
        )
        .unwrap();
        assert_eq!(tag.uid(), &[0xDE, 0xAD, 0xBE, 0xEF]);

        let (mut reader, handle) = MockReader::new();
        reader.open().await.unwrap();
        handle.present(tag).await.unwrap();

        let target = reader.poll_for_target().await.unwrap().unwrap();
        reader
            .authenticate_sector(&target, 4, &SectorKey::default())
            .await
            .unwrap();
        let block = reader.read_block(4).await.unwrap();
        assert_eq!(block[15], 0x0F);
    }

    #[test]
    fn test_explicit_secret_overrides_default() {
        let tag = parse_tag_line(
            "01020304 00000000000000000000000000000000 A0A1A2A3A4A5",
            4,
            SectorKey::default(),
        )
        .unwrap();
        let expected = SimulatedTag::new(vec![1, 2, 3, 4])
            .with_sector_key(SectorKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]))
            .with_block(4, [0; 16]);
        assert_eq!(tag, expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::uid_only("DEADBEEF")]
    #[case::odd_uid("DEADBEE 00000000000000000000000000000000")]
    #[case::short_block("DEADBEEF 0000")]
    #[case::non_hex_block("DEADBEEF 0000000000000000000000000000000G")]
    #[case::bad_secret("DEADBEEF 00000000000000000000000000000000 FF")]
    #[case::trailing("DEADBEEF 00000000000000000000000000000000 FFFFFFFFFFFF x")]
    fn test_invalid_lines(#[case] line: &str) {
        assert!(parse_tag_line(line, 4, SectorKey::default()).is_err());
    }
}
