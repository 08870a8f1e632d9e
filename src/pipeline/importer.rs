use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;

use crate::core::{Envelope, Result, StoreFormat, TimeInterval};
use crate::pipeline::Pipeline;
use crate::reader::{DeliveryPolicy, SharedReader, StreamReader, StreamReaderExt};
use crate::store::{IndexEntry, Store, StreamMetadata};

/// An input store of a [`Pipeline`].
///
/// Opening an importer attaches its reader to the pipeline and proposes the
/// store's originating-time interval as replay range. Subscriptions made on
/// the importer are delivered when the pipeline runs.
pub struct Importer {
    store_name: String,
    store_path: PathBuf,
    reader: SharedReader,
    policy: DeliveryPolicy,
}

impl Importer {
    pub fn open(pipeline: &mut Pipeline, store_name: &str, store_path: &Path) -> Result<Self> {
        let reader = Store::open(store_name, store_path)?;
        Ok(Self::attach(pipeline, store_name, store_path, reader))
    }

    pub fn open_as(pipeline: &mut Pipeline, store_name: &str, store_path: &Path, format: StoreFormat) -> Result<Self> {
        let reader = Store::open_as(store_name, store_path, format)?;
        Ok(Self::attach(pipeline, store_name, store_path, reader))
    }

    fn attach(pipeline: &mut Pipeline, store_name: &str, store_path: &Path, reader: Box<dyn StreamReader>) -> Self {
        pipeline.propose_replay_time(reader.originating_time_interval());
        let reader: SharedReader = Arc::new(Mutex::new(reader));
        pipeline.attach(reader.clone());
        Self {
            store_name: store_name.to_string(),
            store_path: store_path.to_path_buf(),
            reader,
            policy: DeliveryPolicy::Unlimited,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Policy used by [`open_stream`](Importer::open_stream).
    pub fn set_delivery_policy(&mut self, policy: DeliveryPolicy) {
        self.policy = policy;
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn available_streams(&self) -> Vec<StreamMetadata> {
        self.lock().available_streams().cloned().collect()
    }

    pub fn stream_metadata(&self, name: &str) -> Result<StreamMetadata> {
        self.lock().stream_metadata(name).cloned()
    }

    pub fn originating_time_interval(&self) -> TimeInterval {
        self.lock().originating_time_interval()
    }

    pub fn open_stream<T, F>(&self, name: &str, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T, &Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        self.lock().open_stream_with(name, self.policy, callback)
    }

    pub fn open_stream_with<T, F>(&self, name: &str, policy: DeliveryPolicy, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T, &Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        self.lock().open_stream_with(name, policy, callback)
    }

    pub fn open_stream_index<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: FnMut(IndexEntry, &Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        self.lock().open_stream_index(name, Box::new(callback))
    }

    /// Fetches one message of a large stream. Must not be called from a
    /// subscription callback of this importer.
    pub fn read<T: DeserializeOwned>(&self, entry: &IndexEntry) -> Result<T> {
        self.lock().read(entry)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn StreamReader>> {
        self.reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
