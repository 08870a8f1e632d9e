//! Dataset descriptor file.
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "experiment",
//!   "relative_paths": true,
//!   "sessions": [
//!     { "name": "Session 1",
//!       "partitions": [
//!         { "name": "raw", "store_name": "raw", "store_path": "../stores", "reader_type": "binary" }
//!       ] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::meta::{read_json, write_json_atomic};
use crate::core::{Error, Result, StoreFormat};

pub const DESCRIPTOR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub version: u32,
    pub name: String,
    /// Store paths are written relative to the descriptor's directory.
    #[serde(default)]
    pub relative_paths: bool,
    #[serde(default)]
    pub sessions: Vec<SessionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub name: String,
    #[serde(default)]
    pub partitions: Vec<PartitionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub name: String,
    pub store_name: String,
    pub store_path: String,
    #[serde(default)]
    pub reader_type: StoreFormat,
}

impl DatasetDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let descriptor: DatasetDescriptor = read_json(path)?;
        if descriptor.version != DESCRIPTOR_VERSION {
            return Err(Error::UnsupportedVersion(descriptor.version));
        }
        Ok(descriptor)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}
