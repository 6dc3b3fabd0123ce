//! Wire protocol between the access endpoint and its control plane.
//!
//! The control plane drives the allow-list through three per-device topics
//! and receives log events on a fourth. This crate owns everything that is
//! independent of the transport:
//!
//! - [`Topics`]: topic strings derived from the device identifier
//! - [`decode_command`]: inbound payload decoding into a [`KeyCommand`]
//! - [`LogEvent`] and the [`LogPublisher`] queue feeding `client/{D}/log`
//!
//! # Example
//!
//! ```
//! use latchkey_core::DeviceId;
//! use latchkey_protocol::{KeyCommand, Topics, decode_command};
//!
//! let topics = Topics::new(&DeviceId::new("esp-device-1").unwrap());
//! let kind = topics.classify("private/esp-device-1/add-key").unwrap();
//!
//! let command = decode_command(kind, b"000102030405060708090A0B0C0D0E0F").unwrap();
//! assert!(matches!(command, KeyCommand::Add(_)));
//! ```

pub mod command;
pub mod event;
pub mod topic;

pub use command::{KeyCommand, SyncBatch, decode_command, decode_single_key, decode_sync};
pub use event::{LogEvent, LogPublisher, LogReceiver, log_channel};
pub use topic::{ControlTopic, Topics};
