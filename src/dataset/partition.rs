use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::{Result, StoreFormat, TimeInterval};
use crate::reader::{ReaderLease, ReaderRegistry, StreamReader};
use crate::store::{Store, StoreKey, StreamMetadata};

/// Named reference to exactly one store.
///
/// Binding is pure metadata; the store's reader is leased from the dataset's
/// registry on first metadata access and released when the partition is
/// dropped.
pub struct Partition {
    name: String,
    key: StoreKey,
    reader_type: StoreFormat,
    registry: ReaderRegistry,
    lease: Mutex<Option<ReaderLease>>,
}

impl Partition {
    pub(crate) fn new(
        name: impl Into<String>,
        store_name: impl Into<String>,
        store_path: impl Into<PathBuf>,
        reader_type: StoreFormat,
        registry: ReaderRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            key: StoreKey::new(store_name, store_path),
            reader_type,
            registry,
            lease: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store_name(&self) -> &str {
        &self.key.name
    }

    pub fn store_path(&self) -> &Path {
        &self.key.path
    }

    pub fn store_key(&self) -> &StoreKey {
        &self.key
    }

    pub fn reader_type(&self) -> StoreFormat {
        self.reader_type
    }

    /// True once the backing reader has been opened.
    pub fn is_open(&self) -> bool {
        self.lease_slot().is_some()
    }

    /// Runs `f` against the shared reader, opening it if needed.
    pub fn with_reader<R>(&self, f: impl FnOnce(&dyn StreamReader) -> R) -> Result<R> {
        let mut slot = self.lease_slot();
        let lease = match slot.take() {
            Some(lease) => lease,
            None => self.registry.acquire(&self.key, self.reader_type)?,
        };
        let result = f(&**lease.reader());
        *slot = Some(lease);
        Ok(result)
    }

    pub fn available_streams(&self) -> Result<Vec<StreamMetadata>> {
        self.with_reader(|reader| reader.available_streams().cloned().collect())
    }

    pub fn stream_metadata(&self, name: &str) -> Result<StreamMetadata> {
        self.with_reader(|reader| reader.stream_metadata(name).cloned())?
    }

    /// Originating-time interval from the store catalog.
    pub fn originating_time_interval(&self) -> Result<TimeInterval> {
        self.with_reader(|reader| reader.originating_time_interval())
    }

    /// A private reader for replaying this partition's store.
    pub fn open_reader(&self) -> Result<Box<dyn StreamReader>> {
        Store::open_as(&self.key.name, &self.key.path, self.reader_type)
    }

    /// Drops the lease on the shared reader.
    pub fn release(&self) {
        *self.lease_slot() = None;
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Moves the partition to another registry (after a dataset append).
    pub(crate) fn rebind(&mut self, registry: ReaderRegistry) {
        self.release();
        self.registry = registry;
    }

    fn lease_slot(&self) -> std::sync::MutexGuard<'_, Option<ReaderLease>> {
        self.lease.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .field("store_name", &self.key.name)
            .field("store_path", &self.key.path)
            .field("reader_type", &self.reader_type)
            .finish()
    }
}
