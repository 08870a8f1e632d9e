//! The per-store catalog: one JSON file describing every stream of a store.
//!
//! The catalog is written once, atomically, when a writer commits. Its
//! presence is what makes a store exist.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::header::{le_u32, le_u64};
use crate::core::meta::{read_json, write_json_atomic};
use crate::core::{EntityKind, Envelope, Error, Result, StoreFormat, TimeInterval};

pub const CATALOG_VERSION: u32 = 1;

/// Catalog filename for a store (e.g., "trial.catalog.json").
pub fn catalog_filename(store_name: &str) -> String {
    format!("{store_name}.catalog.json")
}

pub fn catalog_path(dir: &Path, store_name: &str) -> PathBuf {
    dir.join(catalog_filename(store_name))
}

/// Type name and JSON value of per-stream supplemental metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplementalMetadata {
    pub type_name: String,
    pub value: serde_json::Value,
}

/// Catalog entry of one logical stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub id: u32,
    pub name: String,
    pub type_name: String,
    /// Messages live in large segments; data records hold [`IndexEntry`]s.
    pub is_indexed: bool,
    pub message_count: u64,
    pub first_message_time: u64,
    pub last_message_time: u64,
    pub first_originating_time: u64,
    pub last_originating_time: u64,
    pub average_message_size: f64,
    pub average_latency_ns: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplemental: Option<SupplementalMetadata>,
}

impl StreamMetadata {
    pub fn new(id: u32, name: impl Into<String>, type_name: impl Into<String>, is_indexed: bool) -> Self {
        Self {
            id,
            name: name.into(),
            type_name: type_name.into(),
            is_indexed,
            message_count: 0,
            first_message_time: 0,
            last_message_time: 0,
            first_originating_time: 0,
            last_originating_time: 0,
            average_message_size: 0.0,
            average_latency_ns: 0.0,
            supplemental: None,
        }
    }

    /// Folds one written message into the running statistics.
    pub fn record(&mut self, envelope: &Envelope, payload_len: usize) {
        if self.message_count == 0 {
            self.first_message_time = envelope.time;
            self.first_originating_time = envelope.originating_time;
            self.last_originating_time = envelope.originating_time;
        } else {
            self.first_originating_time = self.first_originating_time.min(envelope.originating_time);
            self.last_originating_time = self.last_originating_time.max(envelope.originating_time);
        }
        self.last_message_time = envelope.time;
        self.message_count += 1;
        let n = self.message_count as f64;
        self.average_message_size += (payload_len as f64 - self.average_message_size) / n;
        self.average_latency_ns += (envelope.latency_ns() as f64 - self.average_latency_ns) / n;
    }

    pub fn originating_time_interval(&self) -> TimeInterval {
        if self.message_count == 0 {
            TimeInterval::EMPTY
        } else {
            TimeInterval::new(self.first_originating_time, self.last_originating_time)
        }
    }

    pub fn message_time_interval(&self) -> TimeInterval {
        if self.message_count == 0 {
            TimeInterval::EMPTY
        } else {
            TimeInterval::new(self.first_message_time, self.last_message_time)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    pub store_name: String,
    pub format: StoreFormat,
    pub created_at_ns: u64,
    /// Number of `.data` segments (binary stores only).
    #[serde(default)]
    pub data_segments: u32,
    /// Number of `.large` segments (binary stores only).
    #[serde(default)]
    pub large_segments: u32,
    pub streams: Vec<StreamMetadata>,
}

impl Catalog {
    pub fn new(store_name: impl Into<String>, format: StoreFormat, created_at_ns: u64) -> Self {
        Self {
            version: CATALOG_VERSION,
            store_name: store_name.into(),
            format,
            created_at_ns,
            data_segments: 0,
            large_segments: 0,
            streams: Vec::new(),
        }
    }

    /// Loads the catalog of `store_name` from `dir`.
    pub fn load(dir: &Path, store_name: &str) -> Result<Self> {
        let path = catalog_path(dir, store_name);
        if !path.is_file() {
            return Err(Error::not_found(EntityKind::Store, store_name));
        }
        let catalog: Catalog = read_json(&path)?;
        if catalog.version != CATALOG_VERSION {
            return Err(Error::UnsupportedVersion(catalog.version));
        }
        if catalog.store_name != store_name {
            return Err(Error::Corrupt("catalog names another store"));
        }
        Ok(catalog)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json_atomic(&catalog_path(dir, &self.store_name), self)
    }

    pub fn stream(&self, name: &str) -> Option<&StreamMetadata> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn stream_by_id(&self, id: u32) -> Option<&StreamMetadata> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn message_count(&self) -> u64 {
        self.streams.iter().map(|s| s.message_count).sum()
    }

    /// Union of the originating-time intervals of every stream.
    pub fn originating_time_interval(&self) -> TimeInterval {
        self.streams
            .iter()
            .fold(TimeInterval::EMPTY, |acc, s| acc.union(&s.originating_time_interval()))
    }

    pub fn message_time_interval(&self) -> TimeInterval {
        self.streams
            .iter()
            .fold(TimeInterval::EMPTY, |acc, s| acc.union(&s.message_time_interval()))
    }
}

/// Location of one message of a large stream inside the large segments.
///
/// Opaque to callers: obtained from an index subscription and handed back to
/// the reader to fetch the payload without a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    pub segment: u32,
    /// Byte offset of the large record header within the segment.
    pub offset: u64,
    pub len: u32,
}

impl IndexEntry {
    pub const ENCODED_LEN: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.segment.to_le_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::ENCODED_LEN {
            return Err(Error::Corrupt("bad index entry length"));
        }
        Ok(Self {
            segment: le_u32(buf, 0),
            offset: le_u64(buf, 4),
            len: le_u32(buf, 12),
        })
    }
}
