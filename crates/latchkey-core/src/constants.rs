//! Core constants for the latchkey access endpoint.
//!
//! This module centralises the wire-level and timing constants shared by the
//! store, the sync protocol, the connection supervisor and the authentication
//! loop. Changing a topic or layout constant breaks compatibility with the
//! control plane and with credential stores persisted by earlier builds.
//!
//! # Topic Layout
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `private/{D}/sync-keys` | inbound | JSON array of 32-char hex strings |
//! | `private/{D}/add-key` | inbound | single 32-char hex string |
//! | `private/{D}/remove-key` | inbound | single 32-char hex string |
//! | `discovery` | outbound | device identifier, plain text |
//! | `client/{D}/log` | outbound | JSON object `{message, key?, had_access?}` |
//!
//! ```
//! use latchkey_core::constants::*;
//!
//! let topic = format!("{PRIVATE_TOPIC_PREFIX}/esp-device-1/{TOPIC_ADD_KEY}");
//! assert_eq!(topic, "private/esp-device-1/add-key");
//! ```

// ============================================================================
// Access Keys
// ============================================================================

/// Size of an access key in bytes (one Mifare Classic data block).
pub const ACCESS_KEY_LEN: usize = 16;

/// Length of the hexadecimal wire form of an access key.
pub const ACCESS_KEY_HEX_LEN: usize = ACCESS_KEY_LEN * 2;

/// Size of a Mifare Classic sector key (key A) in bytes.
pub const SECTOR_KEY_LEN: usize = 6;

/// Maximum number of access keys held by the credential store.
pub const MAX_KEYS: usize = 256;

// ============================================================================
// Topics
// ============================================================================

/// Prefix of every inbound control topic.
pub const PRIVATE_TOPIC_PREFIX: &str = "private";

/// Prefix of every outbound per-device topic.
pub const CLIENT_TOPIC_PREFIX: &str = "client";

/// Full replacement of the allow-list.
pub const TOPIC_SYNC_KEYS: &str = "sync-keys";

/// Single key addition.
pub const TOPIC_ADD_KEY: &str = "add-key";

/// Single key removal.
pub const TOPIC_REMOVE_KEY: &str = "remove-key";

/// Suffix of the outbound log topic.
pub const TOPIC_LOG: &str = "log";

/// Shared channel on which devices announce themselves after connecting.
pub const DISCOVERY_TOPIC: &str = "discovery";

/// Maximum accepted length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 64;

// ============================================================================
// Persisted Layout
// ============================================================================

/// Key-value namespace holding the credential store.
pub const KEYS_NAMESPACE: &str = "keys";

/// Entry holding the number of valid records.
pub const COUNT_ENTRY: &str = "count";

// ============================================================================
// Reader
// ============================================================================

/// Credential ID length accepted by the authentication loop (Mifare Classic).
pub const SUPPORTED_UID_LEN: usize = 4;

/// Data block holding the access key (first block of sector 1).
pub const DEFAULT_SECTOR_BLOCK: u8 = 4;

/// Factory default Mifare Classic key A.
pub const DEFAULT_SECTOR_KEY: [u8; SECTOR_KEY_LEN] = [0xFF; SECTOR_KEY_LEN];

/// Delay between reader polls in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// ============================================================================
// Actuator Timing (milliseconds)
// ============================================================================

/// Delay after switching on the granted indicator before the buzzer pattern.
pub const UNLOCK_LEAD_IN_MS: u64 = 150;

/// Length of each buzzer pulse (and gap) in the unlock pattern.
pub const UNLOCK_PULSE_MS: u64 = 150;

/// Number of buzzer pulses in the unlock pattern.
pub const UNLOCK_PULSE_COUNT: u32 = 3;

/// Hold time after the unlock pattern before returning to the idle state.
pub const UNLOCK_HOLD_MS: u64 = 300;

/// Length of the single sustained denial pulse.
pub const DENY_PULSE_MS: u64 = 1000;

// ============================================================================
// Connection
// ============================================================================

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// MQTT keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;

/// Fixed delay before retrying a failed or dropped session.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Pause applied when the network link is down.
pub const LINK_RETRY_PAUSE_MS: u64 = 150;

/// Timeout for establishing the transport session.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Interval between supervisor service ticks.
pub const DEFAULT_SERVICE_INTERVAL_MS: u64 = 10;

/// Capacity of the outbound log event queue.
pub const LOG_QUEUE_CAPACITY: usize = 64;
