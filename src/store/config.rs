//! Store writer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::meta::read_json;
use crate::core::Result;

/// Configuration for a binary store writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data segment size in bytes.
    /// Default: 256 MB
    pub segment_size: u64,

    /// Large-payload segment size in bytes.
    /// Default: 1 GB
    pub large_segment_size: u64,

    /// Payloads above this size written to a stream that is not flagged large
    /// are reported once per stream with a warning.
    /// Default: 4 MB
    pub large_message_threshold: usize,

    /// fsync segments and the catalog on commit.
    /// Default: true
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segment_size: 256 * 1024 * 1024,       // 256 MB
            large_segment_size: 1024 * 1024 * 1024, // 1 GB
            large_message_threshold: 4 * 1024 * 1024,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Loads a config from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn with_segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    pub fn with_large_segment_size(mut self, bytes: u64) -> Self {
        self.large_segment_size = bytes;
        self
    }
}
