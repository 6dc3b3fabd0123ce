//! The persisted allow-list.
//!
//! Layout inside the namespace: integer `count`, and one 16-byte blob per
//! valid index keyed by the decimal index (`"0"`, `"1"`, ...). Indices
//! `0..count` are valid; there are no gaps and no duplicates.
//!
//! An in-memory mirror answers every read. Writes go to the namespace first
//! and are mirrored only once the namespace accepted them.

use latchkey_core::AccessKey;
use latchkey_core::constants::{ACCESS_KEY_LEN, COUNT_ENTRY, MAX_KEYS};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::namespace::KeyNamespace;

/// Result of [`CredentialStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added { index: usize },
    AlreadyPresent { index: usize },
}

/// Result of [`CredentialStore::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed { index: usize },
    NotFound,
}

/// Result of [`CredentialStore::replace_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Empty input; the store was left alone.
    Unchanged,
    Replaced {
        stored: usize,
        duplicates: usize,
        truncated: usize,
    },
}

fn entry_key(index: usize) -> String {
    index.to_string()
}

/// Records up to the first repeat, the view [`CredentialStore::load`] would
/// produce from `slots`.
fn distinct_prefix(slots: Vec<AccessKey>) -> Vec<AccessKey> {
    let mut keys: Vec<AccessKey> = Vec::with_capacity(slots.len());
    for key in slots {
        if keys.contains(&key) {
            break;
        }
        keys.push(key);
    }
    keys
}

/// Dense, persisted, duplicate-free sequence of access keys.
#[derive(Debug)]
pub struct CredentialStore<N> {
    namespace: N,
    keys: Vec<AccessKey>,
    capacity: usize,
}

impl<N: KeyNamespace> CredentialStore<N> {
    /// Load the store from `namespace`.
    ///
    /// A missing `count` means an empty store. If a record below `count` is
    /// missing, malformed or a repeat of an earlier one, the store is
    /// truncated to the records before it and the corrected count is
    /// persisted.
    pub async fn load(namespace: N) -> StorageResult<Self> {
        Self::load_with_capacity(namespace, MAX_KEYS).await
    }

    pub async fn load_with_capacity(namespace: N, capacity: usize) -> StorageResult<Self> {
        let stored_count = namespace.get_int(COUNT_ENTRY).await?.unwrap_or(0);
        let count = match usize::try_from(stored_count) {
            Ok(count) if count <= capacity => count,
            _ => {
                warn!(count = stored_count, capacity, "Persisted count out of range, clamping");
                stored_count.clamp(0, capacity as i64) as usize
            }
        };

        let mut keys = Vec::with_capacity(count);
        for index in 0..count {
            let record = match namespace.get_bytes(&entry_key(index)).await {
                Ok(record) => record,
                Err(StorageError::Corrupt(reason)) => {
                    warn!(index, count, %reason, "Malformed key record, truncating store");
                    break;
                }
                Err(e) => return Err(e),
            };
            match record.as_deref().map(AccessKey::from_slice) {
                Some(Ok(key)) if keys.contains(&key) => {
                    warn!(index, count, key = %key, "Repeated key record, truncating store");
                    break;
                }
                Some(Ok(key)) => keys.push(key),
                _ => {
                    warn!(index, count, "Unreadable key record, truncating store");
                    break;
                }
            }
        }

        if keys.len() as i64 != stored_count {
            namespace.put_int(COUNT_ENTRY, keys.len() as i64).await?;
        }

        info!(count = keys.len(), "Credential store loaded");
        Ok(Self {
            namespace,
            keys,
            capacity,
        })
    }

    /// Key at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<AccessKey> {
        self.keys.get(index).copied()
    }

    pub fn contains(&self, key: &AccessKey) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the stored keys in index order.
    pub fn keys(&self) -> Vec<AccessKey> {
        self.keys.clone()
    }

    pub fn namespace(&self) -> &N {
        &self.namespace
    }

    fn position(&self, key: &AccessKey) -> Option<usize> {
        self.keys.iter().position(|stored| stored == key)
    }

    /// Append `key` unless it is already stored.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when full, `ShortWrite` or a backend error when the
    /// record or the count could not be persisted. The store is unchanged on
    /// error.
    pub async fn add(&mut self, key: AccessKey) -> StorageResult<AddOutcome> {
        if let Some(index) = self.position(&key) {
            debug!(key = %key, index, "Key already stored");
            return Ok(AddOutcome::AlreadyPresent { index });
        }

        if self.keys.len() >= self.capacity {
            return Err(StorageError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = self.keys.len();
        self.write_record(index, &key).await?;
        self.namespace
            .put_int(COUNT_ENTRY, (index + 1) as i64)
            .await?;

        self.keys.push(key);
        info!(key = %key, index, count = self.keys.len(), "Key added");
        Ok(AddOutcome::Added { index })
    }

    /// Remove `key`, moving the last record into its slot.
    ///
    /// # Errors
    ///
    /// A failure to copy the last record aborts the removal with nothing
    /// changed. A failure to persist the new count puts the removed key back
    /// into its slot; if that also fails, the in-memory view is brought in
    /// line with what the namespace now holds.
    pub async fn remove(&mut self, key: &AccessKey) -> StorageResult<RemoveOutcome> {
        let Some(index) = self.position(key) else {
            debug!(key = %key, "Key not stored, nothing to remove");
            return Ok(RemoveOutcome::NotFound);
        };

        let last = self.keys.len() - 1;
        if index != last {
            self.write_record(index, &self.keys[last]).await?;
        }

        if let Err(e) = self.namespace.put_int(COUNT_ENTRY, last as i64).await {
            if index != last
                && let Err(restore) = self.write_record(index, key).await
            {
                warn!(index, error = %restore, "Failed to restore key record");
                let mut slots = self.keys.clone();
                slots[index] = slots[last];
                self.keys = distinct_prefix(slots);
            }
            return Err(e);
        }

        if let Err(e) = self.namespace.remove(&entry_key(last)).await {
            warn!(index = last, error = %e, "Failed to delete trailing key record");
        }

        self.keys.swap_remove(index);
        info!(key = %key, index, count = self.keys.len(), "Key removed");
        Ok(RemoveOutcome::Removed { index })
    }

    /// Replace the whole allow-list.
    ///
    /// An empty slice leaves the store untouched. Duplicates are dropped
    /// (first occurrence wins) and anything beyond capacity is truncated.
    ///
    /// # Errors
    ///
    /// Writing stops at the first record that fails. The records written
    /// before it become the whole list and the record error is returned, so
    /// no key from the previous list survives a partial replacement. If the
    /// count cannot be persisted either, the in-memory view follows what the
    /// namespace holds: the new records written so far over the old ones.
    pub async fn replace_all(&mut self, keys: &[AccessKey]) -> StorageResult<ReplaceOutcome> {
        if keys.is_empty() {
            debug!("Empty replacement, store unchanged");
            return Ok(ReplaceOutcome::Unchanged);
        }

        let mut unique: Vec<AccessKey> = Vec::with_capacity(keys.len().min(self.capacity));
        let mut duplicates = 0;
        for key in keys {
            if unique.contains(key) {
                duplicates += 1;
            } else {
                unique.push(*key);
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "Dropping duplicate keys from replacement");
        }

        let truncated = unique.len().saturating_sub(self.capacity);
        if truncated > 0 {
            warn!(truncated, capacity = self.capacity, "Replacement exceeds capacity, truncating");
            unique.truncate(self.capacity);
        }

        let mut written = 0;
        let mut failure = None;
        for (index, key) in unique.iter().enumerate() {
            if let Err(e) = self.write_record(index, key).await {
                warn!(index, error = %e, "Failed to write key record, truncating replacement");
                failure = Some(e);
                break;
            }
            written += 1;
        }

        if let Err(e) = self.namespace.put_int(COUNT_ENTRY, written as i64).await {
            let slots = self
                .keys
                .iter()
                .enumerate()
                .map(|(index, old)| if index < written { unique[index] } else { *old })
                .collect();
            self.keys = distinct_prefix(slots);
            return Err(e);
        }

        for index in written..self.keys.len() {
            if let Err(e) = self.namespace.remove(&entry_key(index)).await {
                warn!(index, error = %e, "Failed to clear stale key record");
            }
        }

        unique.truncate(written);
        self.keys = unique;

        if let Some(e) = failure {
            return Err(e);
        }

        info!(count = written, "Key list replaced");
        Ok(ReplaceOutcome::Replaced {
            stored: written,
            duplicates,
            truncated,
        })
    }

    async fn write_record(&self, index: usize, key: &AccessKey) -> StorageResult<()> {
        let entry = entry_key(index);
        let written = self.namespace.put_bytes(&entry, key.as_bytes()).await?;
        if written != ACCESS_KEY_LEN {
            return Err(StorageError::ShortWrite {
                key: entry,
                expected: ACCESS_KEY_LEN,
                written,
            });
        }
        Ok(())
    }
}
