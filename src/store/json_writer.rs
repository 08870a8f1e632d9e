//! Plain JSON store writer: `{name}.data.jsonl`, one message per line.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Clock, Envelope, Error, Result, StoreFormat};
use crate::store::catalog::{Catalog, SupplementalMetadata};
use crate::store::writer::{StoreWriter, StreamOptions, WriterState};

pub fn json_data_filename(store_name: &str) -> String {
    format!("{store_name}.data.jsonl")
}

pub fn json_data_path(dir: &Path, store_name: &str) -> PathBuf {
    dir.join(json_data_filename(store_name))
}

/// One line of a JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JsonLine {
    pub stream: u32,
    pub envelope: Envelope,
    pub data: serde_json::Value,
}

pub struct JsonStoreWriter {
    dir: PathBuf,
    data_path: PathBuf,
    file: Option<BufWriter<File>>,
    sync_on_commit: bool,
    state: WriterState,
}

impl JsonStoreWriter {
    pub(crate) fn new(store_name: &str, dir: &Path, sync_on_commit: bool) -> Result<Self> {
        let data_path = json_data_path(dir, store_name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&data_path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            data_path,
            file: Some(BufWriter::new(file)),
            sync_on_commit,
            state: WriterState::new(store_name, StoreFormat::Json, usize::MAX),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state.set_clock(clock);
        self
    }
}

impl StoreWriter for JsonStoreWriter {
    fn store_name(&self) -> &str {
        &self.state.catalog.store_name
    }

    fn store_path(&self) -> &Path {
        &self.dir
    }

    fn format(&self) -> StoreFormat {
        StoreFormat::Json
    }

    fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.state.set_clock(clock);
    }

    fn create_stream_raw(&mut self, name: &str, type_name: &str, options: StreamOptions) -> Result<u32> {
        if options.large {
            return Err(Error::Unsupported("large streams require the binary format"));
        }
        self.state.add_stream(name, type_name, false)
    }

    fn write_raw(&mut self, stream_id: u32, originating_time: u64, payload: &[u8]) -> Result<Envelope> {
        let data: serde_json::Value = serde_json::from_slice(payload)?;
        let envelope = self.state.stamp(stream_id, originating_time, payload.len())?;
        let line = JsonLine {
            stream: stream_id,
            envelope,
            data,
        };
        let file = self
            .file
            .as_mut()
            .ok_or(Error::Unsupported("store writer already finished"))?;
        serde_json::to_writer(&mut *file, &line)?;
        file.write_all(b"\n")?;
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
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            if self.sync_on_commit {
                file.get_ref().sync_all()?;
            }
        }
        self.state.catalog.save(&self.dir)?;
        self.state.finish();
        log::debug!(
            "committed json store '{}' at {}",
            self.state.catalog.store_name,
            self.dir.display()
        );
        Ok(self.state.catalog.clone())
    }

    fn abort(&mut self) -> Result<()> {
        if self.state.is_finished() {
            return Ok(());
        }
        self.state.finish();
        self.file = None;
        match std::fs::remove_file(&self.data_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for JsonStoreWriter {
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
