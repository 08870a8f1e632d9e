//! Shared, reference-counted readers keyed by `(store name, store path)`.
//!
//! Partitions bound to the same store share one open reader. Each holder keeps
//! a [`ReaderLease`]; the reader (and its file handles) is released when the
//! last lease is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Result, StoreFormat};
use crate::reader::StreamReader;
use crate::store::{Store, StoreKey};

pub type SharedReader = Arc<Mutex<Box<dyn StreamReader>>>;

struct Entry {
    reader: SharedReader,
    leases: usize,
}

#[derive(Clone, Default)]
pub struct ReaderRegistry {
    inner: Arc<Mutex<HashMap<StoreKey, Entry>>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a lease on the reader for `key`, opening it on first use.
    pub fn acquire(&self, key: &StoreKey, format: StoreFormat) -> Result<ReaderLease> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.leases += 1;
            return Ok(ReaderLease {
                registry: self.clone(),
                key: key.clone(),
                reader: entry.reader.clone(),
            });
        }
        let reader: SharedReader = Arc::new(Mutex::new(Store::open_as(&key.name, &key.path, format)?));
        entries.insert(
            key.clone(),
            Entry {
                reader: reader.clone(),
                leases: 1,
            },
        );
        Ok(ReaderLease {
            registry: self.clone(),
            key: key.clone(),
            reader,
        })
    }

    /// Number of stores with an open reader.
    pub fn open_count(&self) -> usize {
        self.entries().len()
    }

    pub fn is_open(&self, key: &StoreKey) -> bool {
        self.entries().contains_key(key)
    }

    fn release(&self, key: &StoreKey) {
        let mut entries = self.entries();
        let remove = match entries.get_mut(key) {
            Some(entry) => {
                entry.leases = entry.leases.saturating_sub(1);
                entry.leases == 0
            }
            None => false,
        };
        if remove {
            entries.remove(key);
            log::debug!("released reader for store '{}'", key.name);
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<StoreKey, Entry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a shared reader open while held.
pub struct ReaderLease {
    registry: ReaderRegistry,
    key: StoreKey,
    reader: SharedReader,
}

impl ReaderLease {
    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn reader(&self) -> MutexGuard<'_, Box<dyn StreamReader>> {
        self.reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ReaderLease {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
