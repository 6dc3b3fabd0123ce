//! Hardware abstraction for the access endpoint.
//!
//! - [`CredentialReader`]: Mifare Classic reader (poll, authenticate, read)
//! - [`OutputPin`]: LEDs, buzzer, failure indicator
//! - [`Actuator`]: the granted and denied feedback sequences
//!
//! Mock implementations in [`mock`] drive the tests and the emulator binary;
//! [`TracingPin`] stands in for GPIO on host builds.
//!
//! # Error Handling
//!
//! All reader operations return [`Result<T>`][error::Result] with
//! [`HardwareError`]. Only a reader that fails to open is fatal.
//!
//! [`CredentialReader`]: traits::CredentialReader
//! [`OutputPin`]: traits::OutputPin

pub mod actuator;
pub mod error;
pub mod mock;
pub mod pin;
pub mod traits;
pub mod types;

pub use actuator::{Actuator, ActuatorTiming};
pub use error::{HardwareError, Result};
pub use pin::TracingPin;
pub use traits::{BLOCK_LEN, CredentialReader, OutputPin};
pub use types::{ReaderInfo, TargetId};
