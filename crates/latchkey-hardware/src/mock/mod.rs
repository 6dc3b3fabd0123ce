//! Mock device implementations for testing and the emulator binary.
//!
//! These devices are controlled programmatically through a handle and need no
//! physical hardware.

pub mod pin;
pub mod reader;

pub use pin::{MockPin, PinTransition};
pub use reader::{MockReader, MockReaderHandle, SimulatedTag};
