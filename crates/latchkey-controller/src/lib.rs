//! Authentication loop for the latchkey access endpoint.
//!
//! - [`AuthCycle`]: validating state machine for one tag presentation
//! - [`AccessController`]: polls the reader, checks the allow-list and drives
//!   the actuator
//!
//! The controller only sees the credential store through a
//! [`StoreReader`](latchkey_storage::StoreReader); allow-list changes arrive
//! from the sync router on another task.

pub mod controller;
pub mod state;

pub use controller::{AccessController, AccessOutcome, ControllerConfig, DenyReason};
pub use state::{AccessState, AuthCycle, StateTransition};
