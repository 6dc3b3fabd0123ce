//! Concurrent access to the credential store.
//!
//! The sync router mutates the store while the authentication loop reads it.
//! Every compound mutation, persistence writes included, runs under the
//! write lock; lookups take the read lock.

use std::sync::Arc;

use latchkey_core::AccessKey;
use tokio::sync::RwLock;

use crate::error::StorageResult;
use crate::namespace::KeyNamespace;
use crate::store::{AddOutcome, CredentialStore, RemoveOutcome, ReplaceOutcome};

/// Cloneable handle to a store guarded by a `tokio::sync::RwLock`.
#[derive(Debug)]
pub struct SharedCredentialStore<N> {
    inner: Arc<RwLock<CredentialStore<N>>>,
}

impl<N> Clone for SharedCredentialStore<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: KeyNamespace> SharedCredentialStore<N> {
    pub fn new(store: CredentialStore<N>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Load from `namespace` and wrap.
    pub async fn load(namespace: N) -> StorageResult<Self> {
        Ok(Self::new(CredentialStore::load(namespace).await?))
    }

    pub async fn add(&self, key: AccessKey) -> StorageResult<AddOutcome> {
        self.inner.write().await.add(key).await
    }

    pub async fn remove(&self, key: &AccessKey) -> StorageResult<RemoveOutcome> {
        self.inner.write().await.remove(key).await
    }

    pub async fn replace_all(&self, keys: &[AccessKey]) -> StorageResult<ReplaceOutcome> {
        self.inner.write().await.replace_all(keys).await
    }

    pub async fn contains(&self, key: &AccessKey) -> bool {
        self.inner.read().await.contains(key)
    }

    pub async fn get(&self, index: usize) -> Option<AccessKey> {
        self.inner.read().await.get(index)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<AccessKey> {
        self.inner.read().await.keys()
    }

    /// Read-only handle for the authentication loop.
    pub fn reader(&self) -> StoreReader<N> {
        StoreReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of a [`SharedCredentialStore`].
#[derive(Debug)]
pub struct StoreReader<N> {
    inner: Arc<RwLock<CredentialStore<N>>>,
}

impl<N> Clone for StoreReader<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: KeyNamespace> StoreReader<N> {
    pub async fn contains(&self, key: &AccessKey) -> bool {
        self.inner.read().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::MemoryNamespace;

    fn key(n: u8) -> AccessKey {
        AccessKey::new([n; 16])
    }

    #[tokio::test]
    async fn test_reader_sees_mutations() {
        let store = SharedCredentialStore::load(MemoryNamespace::new())
            .await
            .unwrap();
        let reader = store.reader();

        assert!(!reader.contains(&key(1)).await);
        store.add(key(1)).await.unwrap();
        assert!(reader.contains(&key(1)).await);
        assert_eq!(reader.len().await, 1);

        store.replace_all(&[key(2), key(3)]).await.unwrap();
        assert!(!reader.contains(&key(1)).await);
        assert_eq!(store.get(1).await, Some(key(3)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_readers_never_see_partial_replace() {
        let store = SharedCredentialStore::load(MemoryNamespace::new())
            .await
            .unwrap();
        let old: Vec<_> = (0..32).map(key).collect();
        let new: Vec<_> = (32..64).map(key).collect();
        store.replace_all(&old).await.unwrap();

        let reader = store.reader();
        let probe = tokio::spawn(async move {
            for _ in 0..200 {
                let len = reader.len().await;
                assert_eq!(len, 32);
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..20 {
            store.replace_all(&new).await.unwrap();
            store.replace_all(&old).await.unwrap();
        }
        probe.await.unwrap();
    }
}
