//! Mock credential reader.
//!
//! Tags are presented through a [`MockReaderHandle`] and are detected by the
//! next [`poll_for_target`](CredentialReader::poll_for_target) call. A
//! presented tag stays in the field until another tag replaces it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use latchkey_core::SectorKey;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{HardwareError, Result};
use crate::traits::{BLOCK_LEN, CredentialReader};
use crate::types::{ReaderInfo, TargetId};

/// Mifare Classic 1K: four blocks per sector (for the small sectors).
const BLOCKS_PER_SECTOR: u8 = 4;

/// A tag that can be presented to a [`MockReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedTag {
    uid: Vec<u8>,
    sector_key: SectorKey,
    blocks: HashMap<u8, [u8; BLOCK_LEN]>,
}

impl SimulatedTag {
    /// A blank tag: transport key `FF..FF`, every block zeroed.
    pub fn new(uid: impl Into<Vec<u8>>) -> Self {
        Self {
            uid: uid.into(),
            sector_key: SectorKey::default(),
            blocks: HashMap::new(),
        }
    }

    pub fn with_sector_key(mut self, key: SectorKey) -> Self {
        self.sector_key = key;
        self
    }

    pub fn with_block(mut self, block: u8, data: [u8; BLOCK_LEN]) -> Self {
        self.blocks.insert(block, data);
        self
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }
}

#[derive(Debug)]
struct Faults {
    available: AtomicBool,
    fail_reads: AtomicBool,
}

/// Mock credential reader.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::{MockReader, SimulatedTag};
/// use latchkey_hardware::traits::CredentialReader;
/// use latchkey_core::SectorKey;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new();
///     reader.open().await?;
///
///     handle.present(SimulatedTag::new(vec![0x04, 0xAB, 0xCD, 0xEF]).with_block(4, [7; 16])).await?;
///
///     let target = reader.poll_for_target().await?.unwrap();
///     reader.authenticate_sector(&target, 4, &SectorKey::default()).await?;
///     assert_eq!(reader.read_block(4).await?, [7; 16]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    tag_rx: mpsc::Receiver<SimulatedTag>,
    faults: Arc<Faults>,
    name: String,
    opened: bool,
    current: Option<SimulatedTag>,
    authenticated_sector: Option<u8>,
}

impl MockReader {
    /// Create a new mock reader with the default name.
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_name("Mock PN532")
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockReaderHandle) {
        let (tag_tx, tag_rx) = mpsc::channel(32);
        let faults = Arc::new(Faults {
            available: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
        });

        let reader = Self {
            tag_rx,
            faults: Arc::clone(&faults),
            name: name.into(),
            opened: false,
            current: None,
            authenticated_sector: None,
        };

        (reader, MockReaderHandle { tag_tx, faults })
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.opened || !self.faults.available.load(Ordering::SeqCst) {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        Ok(())
    }
}

impl CredentialReader for MockReader {
    async fn open(&mut self) -> Result<ReaderInfo> {
        if !self.faults.available.load(Ordering::SeqCst) {
            return Err(HardwareError::initialization_failed(format!(
                "{} did not respond",
                self.name
            )));
        }

        self.opened = true;
        Ok(
            ReaderInfo::new(self.name.clone(), vec!["ISO14443A".to_string()])
                .with_firmware_version("1.6"),
        )
    }

    async fn poll_for_target(&mut self) -> Result<Option<TargetId>> {
        self.ensure_open()?;

        // A closed channel means no more tags will ever arrive
        let Ok(tag) = self.tag_rx.try_recv() else {
            return Ok(None);
        };

        debug!(uid = %TargetId::new(tag.uid.clone()), "Target entered field");
        let target = TargetId::new(tag.uid.clone());
        self.current = Some(tag);
        self.authenticated_sector = None;
        Ok(Some(target))
    }

    async fn authenticate_sector(
        &mut self,
        target: &TargetId,
        block: u8,
        key: &SectorKey,
    ) -> Result<()> {
        self.ensure_open()?;

        let tag = self
            .current
            .as_ref()
            .filter(|tag| tag.uid == target.as_bytes())
            .ok_or_else(|| HardwareError::target_not_present(target.to_hex()))?;

        if tag.sector_key != *key {
            self.authenticated_sector = None;
            return Err(HardwareError::authentication_failed(block));
        }

        self.authenticated_sector = Some(block / BLOCKS_PER_SECTOR);
        Ok(())
    }

    async fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_LEN]> {
        self.ensure_open()?;

        if self.authenticated_sector != Some(block / BLOCKS_PER_SECTOR) {
            return Err(HardwareError::authentication_failed(block));
        }

        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(HardwareError::card_read(format!("block {block} unreadable")));
        }

        let tag = self
            .current
            .as_ref()
            .ok_or_else(|| HardwareError::target_not_present("field empty"))?;

        Ok(tag.blocks.get(&block).copied().unwrap_or([0; BLOCK_LEN]))
    }
}

/// Handle for controlling a [`MockReader`].
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    tag_tx: mpsc::Sender<SimulatedTag>,
    faults: Arc<Faults>,
}

impl MockReaderHandle {
    /// Present a tag to the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader has been dropped.
    pub async fn present(&self, tag: SimulatedTag) -> Result<()> {
        self.tag_tx
            .send(tag)
            .await
            .map_err(|_| HardwareError::disconnected("mock reader dropped"))
    }

    /// Simulate the reader disappearing (or coming back).
    pub fn set_available(&self, available: bool) {
        self.faults.available.store(available, Ordering::SeqCst);
    }

    /// Make every block read fail.
    pub fn set_read_failure(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: [u8; 4] = [0x04, 0xAB, 0xCD, 0xEF];

    async fn opened() -> (MockReader, MockReaderHandle) {
        let (mut reader, handle) = MockReader::new();
        reader.open().await.unwrap();
        (reader, handle)
    }

    #[tokio::test]
    async fn test_open_reports_reader_info() {
        let (mut reader, _handle) = MockReader::with_name("Test Reader");
        let info = reader.open().await.unwrap();
        assert_eq!(info.name, "Test Reader");
        assert!(info.protocols.contains(&"ISO14443A".to_string()));
    }

    #[tokio::test]
    async fn test_open_fails_when_unavailable() {
        let (mut reader, handle) = MockReader::new();
        handle.set_available(false);
        let error = reader.open().await.unwrap_err();
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn test_poll_requires_open() {
        let (mut reader, _handle) = MockReader::new();
        assert!(reader.poll_for_target().await.is_err());
    }

    #[tokio::test]
    async fn test_poll_empty_field() {
        let (mut reader, _handle) = opened().await;
        assert_eq!(reader.poll_for_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_present_authenticate_and_read() {
        let (mut reader, handle) = opened().await;
        handle
            .present(SimulatedTag::new(UID).with_block(4, [0x11; 16]))
            .await
            .unwrap();

        let target = reader.poll_for_target().await.unwrap().unwrap();
        assert_eq!(target.as_bytes(), &UID);

        reader
            .authenticate_sector(&target, 4, &SectorKey::default())
            .await
            .unwrap();
        assert_eq!(reader.read_block(4).await.unwrap(), [0x11; 16]);

        // Same sector, unwritten block
        assert_eq!(reader.read_block(5).await.unwrap(), [0; 16]);
    }

    #[tokio::test]
    async fn test_wrong_sector_key() {
        let (mut reader, handle) = opened().await;
        let secret = SectorKey::new([1, 2, 3, 4, 5, 6]);
        handle
            .present(SimulatedTag::new(UID).with_sector_key(secret))
            .await
            .unwrap();

        let target = reader.poll_for_target().await.unwrap().unwrap();
        let error = reader
            .authenticate_sector(&target, 4, &SectorKey::default())
            .await
            .unwrap_err();
        assert!(matches!(error, HardwareError::AuthenticationFailed { block: 4 }));

        reader.authenticate_sector(&target, 4, &secret).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_requires_authentication() {
        let (mut reader, handle) = opened().await;
        handle.present(SimulatedTag::new(UID)).await.unwrap();
        let target = reader.poll_for_target().await.unwrap().unwrap();

        assert!(reader.read_block(4).await.is_err());

        reader
            .authenticate_sector(&target, 4, &SectorKey::default())
            .await
            .unwrap();
        // Block 8 lives in another sector
        assert!(reader.read_block(8).await.is_err());
    }

    #[tokio::test]
    async fn test_read_failure_injection() {
        let (mut reader, handle) = opened().await;
        handle.present(SimulatedTag::new(UID)).await.unwrap();
        let target = reader.poll_for_target().await.unwrap().unwrap();
        reader
            .authenticate_sector(&target, 4, &SectorKey::default())
            .await
            .unwrap();

        handle.set_read_failure(true);
        let error = reader.read_block(4).await.unwrap_err();
        assert!(matches!(error, HardwareError::CardReadError { .. }));
    }

    #[tokio::test]
    async fn test_authenticate_other_target() {
        let (mut reader, handle) = opened().await;
        handle.present(SimulatedTag::new(UID)).await.unwrap();
        reader.poll_for_target().await.unwrap().unwrap();

        let stranger = TargetId::new(vec![9, 9, 9, 9]);
        let error = reader
            .authenticate_sector(&stranger, 4, &SectorKey::default())
            .await
            .unwrap_err();
        assert!(matches!(error, HardwareError::TargetNotPresent { .. }));
    }

    #[tokio::test]
    async fn test_tags_detected_in_order() {
        let (mut reader, handle) = opened().await;
        handle.present(SimulatedTag::new([1, 1, 1, 1])).await.unwrap();
        handle.present(SimulatedTag::new([2, 2, 2, 2])).await.unwrap();

        let first = reader.poll_for_target().await.unwrap().unwrap();
        let second = reader.poll_for_target().await.unwrap().unwrap();
        assert_eq!(first.as_bytes(), &[1, 1, 1, 1]);
        assert_eq!(second.as_bytes(), &[2, 2, 2, 2]);
        assert_eq!(reader.poll_for_target().await.unwrap(), None);
    }
}
