//! Flat key/value namespaces.
//!
//! The credential store persists through a [`KeyNamespace`]: integers and
//! byte blobs addressed by short string keys. Two backends exist, SQLite for
//! deployments and [`MemoryNamespace`] for tests and volatile runs. Use
//! [`AnyNamespace`] when the backend is chosen at runtime.

#![allow(async_fn_in_trait)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StorageError, StorageResult};
use crate::sqlite::SqliteNamespace;

/// Persistent key/value namespace.
///
/// Implementations use native async trait methods (Edition 2024), so the
/// trait is not object-safe; dispatch through generics or [`AnyNamespace`].
pub trait KeyNamespace: Send + Sync {
    async fn get_int(&self, key: &str) -> StorageResult<Option<i64>>;

    async fn put_int(&self, key: &str, value: i64) -> StorageResult<()>;

    async fn get_bytes(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, returning the number of bytes written.
    ///
    /// A return value smaller than `value.len()` is a short write; the
    /// caller decides how to treat it.
    async fn put_bytes(&self, key: &str, value: &[u8]) -> StorageResult<usize>;

    /// Delete `key`. Returns `true` if it existed.
    async fn remove(&self, key: &str) -> StorageResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(i64),
    Bytes(Vec<u8>),
}

/// Write failure injected into a [`MemoryNamespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFault {
    #[default]
    None,
    /// `put_bytes` stores nothing and reports half the bytes written.
    Short,
    /// Every write returns an error.
    Fail,
    /// `put_int` returns an error; blobs and removals still succeed.
    FailInts,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Value>,
    fault: WriteFault,
    /// Writes left before every write fails.
    budget: Option<usize>,
    writes: usize,
}

/// In-memory namespace.
///
/// Clones share the same entries, which lets a test inspect what the store
/// persisted or reopen a store over the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryNamespace {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inject `fault`. Also clears any budget set by [`fail_writes_after`].
    ///
    /// [`fail_writes_after`]: MemoryNamespace::fail_writes_after
    pub fn set_write_fault(&self, fault: WriteFault) {
        let mut state = self.lock();
        state.fault = fault;
        state.budget = None;
    }

    /// Let the next `writes` writes succeed, then fail every write.
    pub fn fail_writes_after(&self, writes: usize) {
        self.lock().budget = Some(writes);
    }

    /// Number of successful writes (puts and removes) so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn contains_entry(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    fn check_fault(state: &mut MemoryState) -> StorageResult<()> {
        match state.budget {
            Some(0) => Err(StorageError::Backend("write budget exhausted".to_string())),
            _ if state.fault == WriteFault::Fail => {
                Err(StorageError::Backend("injected write failure".to_string()))
            }
            Some(left) => {
                state.budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl KeyNamespace for MemoryNamespace {
    async fn get_int(&self, key: &str) -> StorageResult<Option<i64>> {
        match self.lock().entries.get(key) {
            Some(Value::Int(value)) => Ok(Some(*value)),
            Some(Value::Bytes(_)) => Err(StorageError::Corrupt(format!(
                "entry {key} holds bytes, expected an integer"
            ))),
            None => Ok(None),
        }
    }

    async fn put_int(&self, key: &str, value: i64) -> StorageResult<()> {
        let mut state = self.lock();
        if state.fault == WriteFault::FailInts {
            return Err(StorageError::Backend("injected integer write failure".to_string()));
        }
        Self::check_fault(&mut state)?;
        state.entries.insert(key.to_string(), Value::Int(value));
        state.writes += 1;
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.lock().entries.get(key) {
            Some(Value::Bytes(value)) => Ok(Some(value.clone())),
            Some(Value::Int(_)) => Err(StorageError::Corrupt(format!(
                "entry {key} holds an integer, expected bytes"
            ))),
            None => Ok(None),
        }
    }

    async fn put_bytes(&self, key: &str, value: &[u8]) -> StorageResult<usize> {
        let mut state = self.lock();
        Self::check_fault(&mut state)?;
        if state.fault == WriteFault::Short {
            return Ok(value.len() / 2);
        }
        state
            .entries
            .insert(key.to_string(), Value::Bytes(value.to_vec()));
        state.writes += 1;
        Ok(value.len())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut state = self.lock();
        Self::check_fault(&mut state)?;
        let existed = state.entries.remove(key).is_some();
        state.writes += 1;
        Ok(existed)
    }
}

/// Runtime-selected namespace backend.
#[derive(Debug, Clone)]
pub enum AnyNamespace {
    Memory(MemoryNamespace),
    Sqlite(SqliteNamespace),
}

impl KeyNamespace for AnyNamespace {
    async fn get_int(&self, key: &str) -> StorageResult<Option<i64>> {
        match self {
            Self::Memory(ns) => ns.get_int(key).await,
            Self::Sqlite(ns) => ns.get_int(key).await,
        }
    }

    async fn put_int(&self, key: &str, value: i64) -> StorageResult<()> {
        match self {
            Self::Memory(ns) => ns.put_int(key, value).await,
            Self::Sqlite(ns) => ns.put_int(key, value).await,
        }
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self {
            Self::Memory(ns) => ns.get_bytes(key).await,
            Self::Sqlite(ns) => ns.get_bytes(key).await,
        }
    }

    async fn put_bytes(&self, key: &str, value: &[u8]) -> StorageResult<usize> {
        match self {
            Self::Memory(ns) => ns.put_bytes(key, value).await,
            Self::Sqlite(ns) => ns.put_bytes(key, value).await,
        }
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        match self {
            Self::Memory(ns) => ns.remove(key).await,
            Self::Sqlite(ns) => ns.remove(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_int_and_bytes() {
        let ns = MemoryNamespace::new();
        assert_eq!(ns.get_int("count").await.unwrap(), None);

        ns.put_int("count", 2).await.unwrap();
        assert_eq!(ns.get_int("count").await.unwrap(), Some(2));

        assert_eq!(ns.put_bytes("0", &[1, 2, 3]).await.unwrap(), 3);
        assert_eq!(ns.get_bytes("0").await.unwrap(), Some(vec![1, 2, 3]));

        assert!(ns.remove("0").await.unwrap());
        assert!(!ns.remove("0").await.unwrap());
        assert_eq!(ns.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_type_mismatch_is_corrupt() {
        let ns = MemoryNamespace::new();
        ns.put_bytes("count", &[0; 4]).await.unwrap();
        let error = ns.get_int("count").await.unwrap_err();
        assert!(matches!(error, StorageError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_memory_short_write() {
        let ns = MemoryNamespace::new();
        ns.set_write_fault(WriteFault::Short);
        assert_eq!(ns.put_bytes("0", &[0; 16]).await.unwrap(), 8);
        assert!(!ns.contains_entry("0"));
    }

    #[tokio::test]
    async fn test_memory_failed_write() {
        let ns = MemoryNamespace::new();
        ns.set_write_fault(WriteFault::Fail);
        assert!(ns.put_int("count", 1).await.is_err());
        assert!(ns.remove("count").await.is_err());
        assert_eq!(ns.write_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_int_fault_spares_blobs() {
        let ns = MemoryNamespace::new();
        ns.set_write_fault(WriteFault::FailInts);
        assert!(ns.put_int("count", 1).await.is_err());
        assert_eq!(ns.put_bytes("0", &[1; 16]).await.unwrap(), 16);
        assert!(ns.remove("0").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_write_budget() {
        let ns = MemoryNamespace::new();
        ns.fail_writes_after(2);
        ns.put_int("count", 1).await.unwrap();
        ns.put_bytes("0", &[1; 16]).await.unwrap();
        assert!(ns.put_bytes("1", &[2; 16]).await.is_err());
        assert!(ns.remove("0").await.is_err());

        ns.set_write_fault(WriteFault::None);
        ns.put_bytes("1", &[2; 16]).await.unwrap();
        assert_eq!(ns.write_count(), 3);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let ns = MemoryNamespace::new();
        let other = ns.clone();
        ns.put_int("count", 7).await.unwrap();
        assert_eq!(other.get_int("count").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_any_namespace_dispatch() {
        let inner = MemoryNamespace::new();
        let ns = AnyNamespace::Memory(inner.clone());
        ns.put_bytes("1", &[9; 16]).await.unwrap();
        assert!(inner.contains_entry("1"));
    }
}
