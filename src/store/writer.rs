//! The store writer capability and the bookkeeping shared by its formats.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::core::codec;
use crate::core::{Clock, EntityKind, Envelope, Error, Result, StoreFormat, SystemClock};
use crate::store::catalog::{Catalog, StreamMetadata, SupplementalMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Store payloads out of line and expose them through index entries.
    pub large: bool,
}

impl StreamOptions {
    pub fn large() -> Self {
        Self { large: true }
    }
}

/// Write side of a store. Nothing is visible to readers until [`commit`]
/// writes the catalog; [`abort`] (or dropping an uncommitted writer) removes
/// every file the writer created.
///
/// [`commit`]: StoreWriter::commit
/// [`abort`]: StoreWriter::abort
pub trait StoreWriter: Send {
    fn store_name(&self) -> &str;
    fn store_path(&self) -> &Path;
    fn format(&self) -> StoreFormat;

    /// Replaces the clock used to stamp write times.
    fn set_clock(&mut self, clock: Arc<dyn Clock>);

    /// Declares a stream; ids are assigned densely from 0.
    fn create_stream_raw(&mut self, name: &str, type_name: &str, options: StreamOptions) -> Result<u32>;

    /// Appends one encoded message and returns the envelope it was stored with.
    fn write_raw(&mut self, stream_id: u32, originating_time: u64, payload: &[u8]) -> Result<Envelope>;

    fn set_supplemental_raw(&mut self, stream_id: u32, metadata: SupplementalMetadata) -> Result<()>;

    /// The catalog as accumulated so far.
    fn catalog(&self) -> &Catalog;

    fn commit(&mut self) -> Result<Catalog>;

    fn abort(&mut self) -> Result<()>;
}

/// Typed reference to a stream created on a writer.
#[derive(Debug)]
pub struct StreamHandle<T> {
    id: u32,
    name: String,
    _marker: PhantomData<fn(&T)>,
}

impl<T> StreamHandle<T> {
    pub(crate) fn new(id: u32, name: String) -> Self {
        Self {
            id,
            name,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for StreamHandle<T> {
    fn clone(&self) -> Self {
        Self::new(self.id, self.name.clone())
    }
}

/// Typed helpers over [`StoreWriter`] using the store's default codec.
pub trait StoreWriterExt: StoreWriter {
    fn create_stream<T: Serialize>(&mut self, name: &str, options: StreamOptions) -> Result<StreamHandle<T>> {
        let id = self.create_stream_raw(name, std::any::type_name::<T>(), options)?;
        Ok(StreamHandle::new(id, name.to_string()))
    }

    fn write<T: Serialize>(&mut self, stream: &StreamHandle<T>, value: &T, originating_time: u64) -> Result<Envelope> {
        let payload = codec::encode(self.format(), value)?;
        self.write_raw(stream.id, originating_time, &payload)
    }

    fn set_supplemental_metadata<T, M: Serialize>(&mut self, stream: &StreamHandle<T>, value: &M) -> Result<()> {
        let metadata = SupplementalMetadata {
            type_name: std::any::type_name::<M>().to_string(),
            value: serde_json::to_value(value)?,
        };
        self.set_supplemental_raw(stream.id, metadata)
    }
}

impl<W: StoreWriter + ?Sized> StoreWriterExt for W {}

/// Catalog bookkeeping shared by the binary and JSON writers.
pub(crate) struct WriterState {
    pub catalog: Catalog,
    clock: Arc<dyn Clock>,
    last_time: u64,
    next_sequence: Vec<u64>,
    large_message_threshold: usize,
    warned: HashSet<u32>,
    finished: bool,
}

impl WriterState {
    pub fn new(store_name: &str, format: StoreFormat, large_message_threshold: usize) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let created_at_ns = clock.now();
        Self {
            catalog: Catalog::new(store_name, format, created_at_ns),
            clock,
            last_time: 0,
            next_sequence: Vec::new(),
            large_message_threshold,
            warned: HashSet::new(),
            finished: false,
        }
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.finished {
            Err(Error::Unsupported("store writer already finished"))
        } else {
            Ok(())
        }
    }

    pub fn add_stream(&mut self, name: &str, type_name: &str, indexed: bool) -> Result<u32> {
        self.ensure_open()?;
        if self.catalog.stream(name).is_some() {
            return Err(Error::duplicate(EntityKind::Stream, name));
        }
        let id = self.catalog.streams.len() as u32;
        self.catalog
            .streams
            .push(StreamMetadata::new(id, name, type_name, indexed));
        self.next_sequence.push(0);
        Ok(id)
    }

    pub fn stream(&self, stream_id: u32) -> Result<&StreamMetadata> {
        self.catalog
            .streams
            .get(stream_id as usize)
            .ok_or_else(|| Error::not_found(EntityKind::Stream, format!("#{stream_id}")))
    }

    /// Builds the envelope of the next message on `stream_id`. Write times
    /// never go backwards within a store.
    pub fn stamp(&mut self, stream_id: u32, originating_time: u64, payload_len: usize) -> Result<Envelope> {
        self.ensure_open()?;
        let stream = self.stream(stream_id)?;
        let (indexed, name) = (stream.is_indexed, stream.name.clone());
        if !indexed && payload_len > self.large_message_threshold && self.warned.insert(stream_id) {
            log::warn!(
                "stream '{}' of store '{}' writes {} byte payloads inline; consider a large stream",
                name,
                self.catalog.store_name,
                payload_len
            );
        }
        let time = self.clock.now().max(self.last_time);
        self.last_time = time;
        let sequence_id = self.next_sequence[stream_id as usize];
        self.next_sequence[stream_id as usize] += 1;
        Ok(Envelope::new(originating_time, time, stream_id, sequence_id))
    }

    pub fn record(&mut self, envelope: &Envelope, payload_len: usize) {
        if let Some(stream) = self.catalog.streams.get_mut(envelope.source_id as usize) {
            stream.record(envelope, payload_len);
        }
    }

    pub fn set_supplemental(&mut self, stream_id: u32, metadata: SupplementalMetadata) -> Result<()> {
        self.ensure_open()?;
        self.stream(stream_id)?;
        self.catalog.streams[stream_id as usize].supplemental = Some(metadata);
        Ok(())
    }
}
