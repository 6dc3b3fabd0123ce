//! Broker connectivity for the access endpoint.
//!
//! # Architecture
//!
//! ```text
//! ConnectionSupervisor ── tick() every 10 ms
//!     │
//!     ├─> NetworkLink        (link up? retry after 150 ms)
//!     ├─> TransportSession   (MqttSession: MQTT 3.1.1 over TCP)
//!     │       └─> MqttCodec  (tokio-util framing)
//!     ├─> MessageHandler     (SyncRouter -> SharedCredentialStore)
//!     └─> LogReceiver        (queued events -> client/{D}/log)
//! ```

pub mod codec;
pub mod error;
pub mod link;
pub mod mock;
pub mod router;
pub mod session;
pub mod supervisor;

pub use codec::{MqttCodec, Packet};
pub use error::{TransportError, TransportResult};
pub use link::{NetworkLink, SystemLink};
pub use router::{MessageHandler, RouteOutcome, SyncRouter};
pub use session::{InboundMessage, MqttConfig, MqttSession, TransportSession};
pub use supervisor::{ConnectionSupervisor, SessionState, SupervisorConfig};
