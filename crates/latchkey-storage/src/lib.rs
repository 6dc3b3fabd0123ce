//! Persistent credential store.
//!
//! The allow-list of access keys lives in a [`KeyNamespace`] (SQLite or
//! memory) and is mirrored in a [`CredentialStore`]. Tasks share it through
//! [`SharedCredentialStore`]; the authentication loop only ever gets a
//! [`StoreReader`].
//!
//! ```no_run
//! use latchkey_core::AccessKey;
//! use latchkey_storage::{Database, DatabaseConfig, SharedCredentialStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("latchkey.db")).await?;
//! let store = SharedCredentialStore::load(db.namespace("keys")).await?;
//!
//! store.add(AccessKey::new([0x42; 16])).await?;
//! assert!(store.reader().contains(&AccessKey::new([0x42; 16])).await);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod namespace;
pub mod shared;
pub mod sqlite;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use namespace::{AnyNamespace, KeyNamespace, MemoryNamespace, WriteFault};
pub use shared::{SharedCredentialStore, StoreReader};
pub use sqlite::SqliteNamespace;
pub use store::{AddOutcome, CredentialStore, RemoveOutcome, ReplaceOutcome};
