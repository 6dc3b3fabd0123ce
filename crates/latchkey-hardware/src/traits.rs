//! Hardware device trait definitions.
//!
//! Two seams separate the authentication loop from the physical device:
//! [`CredentialReader`] for the ISO14443A reader and [`OutputPin`] for the
//! LEDs and the buzzer. Mock and host implementations live in [`mock`] and
//! [`pin`].
//!
//! The reader trait uses native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT), so it is not object-safe. Use generic type parameters:
//!
//! ```no_run
//! use latchkey_hardware::traits::CredentialReader;
//! use latchkey_hardware::Result;
//!
//! async fn wait_for_tag<R: CredentialReader>(reader: &mut R) -> Result<String> {
//!     loop {
//!         if let Some(target) = reader.poll_for_target().await? {
//!             return Ok(target.to_hex());
//!         }
//!     }
//! }
//! ```
//!
//! [`mock`]: crate::mock
//! [`pin`]: crate::pin

#![allow(async_fn_in_trait)]

use latchkey_core::SectorKey;
use latchkey_core::constants::ACCESS_KEY_LEN;

use crate::error::Result;
use crate::types::{ReaderInfo, TargetId};

/// Size of a Mifare Classic data block.
pub const BLOCK_LEN: usize = ACCESS_KEY_LEN;

/// Proximity credential reader (Mifare Classic over ISO14443A).
pub trait CredentialReader: Send {
    /// Initialise the reader.
    ///
    /// # Errors
    ///
    /// Fails if the reader does not respond. The caller treats this as fatal.
    async fn open(&mut self) -> Result<ReaderInfo>;

    /// Look for a passive target without blocking.
    ///
    /// Returns `Ok(None)` when the field is empty.
    async fn poll_for_target(&mut self) -> Result<Option<TargetId>>;

    /// Authenticate `block` of `target` with key A.
    async fn authenticate_sector(
        &mut self,
        target: &TargetId,
        block: u8,
        key: &SectorKey,
    ) -> Result<()>;

    /// Read a previously authenticated block.
    async fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_LEN]>;
}

/// A digital output (LED, buzzer, failure indicator).
pub trait OutputPin: Send {
    fn set_high(&mut self);

    fn set_low(&mut self);

    fn is_high(&self) -> bool;

    /// Drive the pin to `high`.
    fn set(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}
