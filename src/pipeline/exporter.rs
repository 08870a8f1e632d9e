use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::core::{codec, Envelope, Result, StoreFormat};
use crate::store::{Catalog, StoreWriter, StreamOptions};

type SharedWriter = Arc<Mutex<Box<dyn StoreWriter>>>;

/// An output store of a pipeline. Cheap to clone; clones write to the same
/// store.
#[derive(Clone)]
pub struct Exporter {
    store_name: String,
    store_path: PathBuf,
    format: StoreFormat,
    writer: SharedWriter,
}

impl Exporter {
    pub fn new(writer: Box<dyn StoreWriter>) -> Self {
        Self {
            store_name: writer.store_name().to_string(),
            store_path: writer.store_path().to_path_buf(),
            format: writer.format(),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    pub fn create_stream<T: Serialize>(&self, name: &str) -> Result<Emitter<T>> {
        self.create_stream_with(name, StreamOptions::default())
    }

    pub fn create_stream_with<T: Serialize>(&self, name: &str, options: StreamOptions) -> Result<Emitter<T>> {
        let stream_id = self
            .lock()
            .create_stream_raw(name, std::any::type_name::<T>(), options)?;
        Ok(Emitter {
            stream_id,
            format: self.format,
            writer: self.writer.clone(),
            _marker: PhantomData,
        })
    }

    /// Snapshot of the catalog written so far.
    pub fn catalog(&self) -> Catalog {
        self.lock().catalog().clone()
    }

    pub fn commit(&self) -> Result<Catalog> {
        self.lock().commit()
    }

    pub fn abort(&self) -> Result<()> {
        self.lock().abort()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn StoreWriter>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Typed output stream of an [`Exporter`].
pub struct Emitter<T> {
    stream_id: u32,
    format: StoreFormat,
    writer: SharedWriter,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            stream_id: self.stream_id,
            format: self.format,
            writer: self.writer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize> Emitter<T> {
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn post(&self, value: &T, originating_time: u64) -> Result<Envelope> {
        let payload = codec::encode(self.format, value)?;
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write_raw(self.stream_id, originating_time, &payload)
    }
}
