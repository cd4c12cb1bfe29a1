//! In-memory provisioning registry.
//!
//! Maps bucket names to their opaque IDs and creation parameters, and IDs
//! back to names. Both maps sit behind one `RwLock` so they always change
//! together; every mutation takes the write lock. [`NameLocks`] serializes
//! whole create/delete flows for a single bucket name while leaving other
//! names free to proceed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::OwnedMutexGuard;

use crate::errors::ProvisionError;
use crate::parameters::BucketClassParameters;

/// A provisioned bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub bucket_id: String,
    pub parameters: BucketClassParameters,
}

/// Result of [`BucketRegistry::record_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new entry was inserted.
    Inserted(String),
    /// The name was already registered with identical parameters.
    Existing(String),
}

impl RecordOutcome {
    pub fn bucket_id(&self) -> &str {
        match self {
            RecordOutcome::Inserted(id) | RecordOutcome::Existing(id) => id,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    by_name: HashMap<String, RegistryEntry>,
    by_id: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct BucketRegistry {
    inner: RwLock<Inner>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<RegistryEntry> {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.by_name.get(name).cloned()
    }

    pub fn name_for_id(&self, bucket_id: &str) -> Option<String> {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.by_id.get(bucket_id).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `name -> bucket_id`.
    ///
    /// An existing entry with equal parameters is returned unchanged; one
    /// with different parameters, or an ID already owned by another name,
    /// is a conflict and nothing is modified.
    pub fn record_create(
        &self,
        name: &str,
        bucket_id: &str,
        parameters: &BucketClassParameters,
    ) -> Result<RecordOutcome, ProvisionError> {
        let mut inner = self.inner.write().expect("rwlock poisoned");

        if let Some(existing) = inner.by_name.get(name) {
            if existing.parameters == *parameters {
                return Ok(RecordOutcome::Existing(existing.bucket_id.clone()));
            }
            return Err(ProvisionError::BucketConflict {
                bucket: name.to_string(),
            });
        }
        if let Some(owner) = inner.by_id.get(bucket_id) {
            if owner != name {
                return Err(ProvisionError::BucketConflict {
                    bucket: name.to_string(),
                });
            }
        }

        inner.by_name.insert(
            name.to_string(),
            RegistryEntry {
                bucket_id: bucket_id.to_string(),
                parameters: parameters.clone(),
            },
        );
        inner.by_id.insert(bucket_id.to_string(), name.to_string());
        Ok(RecordOutcome::Inserted(bucket_id.to_string()))
    }

    /// Remove the entry owning `bucket_id`, returning its name.
    ///
    /// An unknown ID is not an error.
    pub fn record_delete(&self, bucket_id: &str) -> Option<String> {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        let name = inner.by_id.remove(bucket_id)?;
        inner.by_name.remove(&name);
        Some(name)
    }
}

/// Per-name async locks.
///
/// Entries are created on demand and dropped once no task holds or waits
/// for them.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while a flow for one name runs.
pub struct NameGuard<'a> {
    owner: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, name: &str) -> NameGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().expect("mutex poisoned");
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        NameGuard {
            owner: self,
            name: name.to_string(),
            guard: Some(guard),
        }
    }

    /// Names with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.lock().expect("mutex poisoned").len()
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock().expect("mutex poisoned");
        if let Some(m) = locks.get(&self.name) {
            if Arc::strong_count(m) == 1 {
                locks.remove(&self.name);
            }
        }
    }
}
