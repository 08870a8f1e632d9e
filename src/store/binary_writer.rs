//! Multiplexed binary store writer.
//!
//! Every message becomes one record in the `.data` segments. Messages of large
//! streams are appended to the `.large` segments instead, and the data record
//! carries the [`IndexEntry`] that locates them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::header::{LargeHeader, RecordHeader, FLAG_INDEXED, LARGE_HEADER_SIZE};
use crate::core::segment::{SegmentKind, SegmentWriter};
use crate::core::{Clock, Envelope, Result, StoreFormat};
use crate::store::catalog::{Catalog, IndexEntry, SupplementalMetadata};
use crate::store::config::StoreConfig;
use crate::store::writer::{StoreWriter, StreamOptions, WriterState};

pub struct BinaryStoreWriter {
    dir: PathBuf,
    config: StoreConfig,
    state: WriterState,
    data: SegmentWriter,
    large: SegmentWriter,
}

impl BinaryStoreWriter {
    /// Callers go through [`crate::store::Store::create`], which checks for
    /// conflicts first.
    pub(crate) fn new(store_name: &str, dir: &Path, config: StoreConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            state: WriterState::new(store_name, StoreFormat::Binary, config.large_message_threshold),
            data: SegmentWriter::new(dir, store_name, SegmentKind::Data, config.segment_size),
            large: SegmentWriter::new(dir, store_name, SegmentKind::Large, config.large_segment_size),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state.set_clock(clock);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn write_large(&mut self, stream_id: u32, payload: &[u8]) -> Result<IndexEntry> {
        let header = LargeHeader::new(stream_id, payload)?;
        let (segment, offset) = self.large.append(&[&header.to_bytes(), payload])?;
        Ok(IndexEntry {
            segment,
            offset,
            len: (LARGE_HEADER_SIZE + payload.len()) as u32,
        })
    }
}

impl StoreWriter for BinaryStoreWriter {
    fn store_name(&self) -> &str {
        &self.state.catalog.store_name
    }

    fn store_path(&self) -> &Path {
        &self.dir
    }

    fn format(&self) -> StoreFormat {
        StoreFormat::Binary
    }

    fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.state.set_clock(clock);
    }

    fn create_stream_raw(&mut self, name: &str, type_name: &str, options: StreamOptions) -> Result<u32> {
        self.state.add_stream(name, type_name, options.large)
    }

    fn write_raw(&mut self, stream_id: u32, originating_time: u64, payload: &[u8]) -> Result<Envelope> {
        let envelope = self.state.stamp(stream_id, originating_time, payload.len())?;
        if self.state.stream(stream_id)?.is_indexed {
            let entry = self.write_large(stream_id, payload)?;
            let body = entry.to_bytes();
            let header = RecordHeader::new(stream_id, envelope, FLAG_INDEXED, &body)?;
            self.data.append(&[&header.to_bytes(), &body])?;
        } else {
            let header = RecordHeader::new(stream_id, envelope, 0, payload)?;
            self.data.append(&[&header.to_bytes(), payload])?;
        }
        self.state.record(&envelope, payload.len());
        Ok(envelope)
    }

    fn set_supplemental_raw(&mut self, stream_id: u32, metadata: SupplementalMetadata) -> Result<()> {
        self.state.set_supplemental(stream_id, metadata)
    }

    fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    fn commit(&mut self) -> Result<Catalog> {
        self.state.ensure_open()?;
        let sync = self.config.sync_on_commit;
        self.state.catalog.data_segments = self.data.finish(sync)?;
        self.state.catalog.large_segments = self.large.finish(sync)?;
        self.state.catalog.save(&self.dir)?;
        self.state.finish();
        log::debug!(
            "committed store '{}' at {} ({} streams, {} messages, {} data segments)",
            self.state.catalog.store_name,
            self.dir.display(),
            self.state.catalog.streams.len(),
            self.state.catalog.message_count(),
            self.state.catalog.data_segments
        );
        Ok(self.state.catalog.clone())
    }

    fn abort(&mut self) -> Result<()> {
        if self.state.is_finished() {
            return Ok(());
        }
        self.state.finish();
        let data = self.data.abort();
        let large = self.large.abort();
        log::debug!("aborted store '{}'", self.state.catalog.store_name);
        data.and(large)
    }
}

impl Drop for BinaryStoreWriter {
    fn drop(&mut self) {
        if !self.state.is_finished() {
            if let Err(err) = self.abort() {
                log::warn!(
                    "failed to clean up uncommitted store '{}': {}",
                    self.state.catalog.store_name,
                    err
                );
            }
        }
    }
}
