//! Stores: the on-disk unit of a catalog plus its segment files.
//!
//! ```text
//! {store_path}/
//!   {name}.catalog.json          <- existence marker, written on commit
//!   {name}.000000.data           <- binary: multiplexed records
//!   {name}.000000.large          <- binary: large-stream payloads
//!   {name}.data.jsonl            <- json: one message per line
//! ```

pub mod binary_writer;
pub mod catalog;
pub mod config;
pub mod json_writer;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};

pub use binary_writer::BinaryStoreWriter;
pub use catalog::{Catalog, IndexEntry, StreamMetadata, SupplementalMetadata};
pub use config::StoreConfig;
pub use json_writer::JsonStoreWriter;
pub use writer::{StoreWriter, StoreWriterExt, StreamHandle, StreamOptions};

use crate::core::segment::remove_segments;
use crate::core::{EntityKind, Error, Result, StoreFormat};
use crate::reader::{BinaryStreamReader, JsonStreamReader, StreamReader};
use catalog::catalog_path;
use json_writer::json_data_path;

/// Value-equality key of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub name: String,
    pub path: PathBuf,
}

impl StoreKey {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Entry points for creating, opening and deleting stores.
pub struct Store;

impl Store {
    /// Creates a binary store with the default configuration.
    pub fn create(name: &str, path: &Path) -> Result<BinaryStoreWriter> {
        Self::create_with_config(name, path, StoreConfig::default())
    }

    pub fn create_with_config(name: &str, path: &Path, config: StoreConfig) -> Result<BinaryStoreWriter> {
        Self::prepare_create(name, path)?;
        log::debug!("creating binary store '{}' at {}", name, path.display());
        Ok(BinaryStoreWriter::new(name, path, config))
    }

    pub fn create_json(name: &str, path: &Path) -> Result<JsonStoreWriter> {
        Self::prepare_create(name, path)?;
        log::debug!("creating json store '{}' at {}", name, path.display());
        JsonStoreWriter::new(name, path, StoreConfig::default().sync_on_commit)
    }

    /// Creates a store of either format behind the writer trait.
    pub fn create_as(name: &str, path: &Path, format: StoreFormat, config: StoreConfig) -> Result<Box<dyn StoreWriter>> {
        match format {
            StoreFormat::Binary => Ok(Box::new(Self::create_with_config(name, path, config)?)),
            StoreFormat::Json => {
                Self::prepare_create(name, path)?;
                Ok(Box::new(JsonStoreWriter::new(name, path, config.sync_on_commit)?))
            }
        }
    }

    /// Opens a store for reading with the reader matching its catalog.
    pub fn open(name: &str, path: &Path) -> Result<Box<dyn StreamReader>> {
        let format = Self::format(name, path)?;
        Self::open_as(name, path, format)
    }

    /// Opens a store with the reader for `format`; fails with
    /// [`Error::FormatMismatch`] if the catalog declares another format.
    pub fn open_as(name: &str, path: &Path, format: StoreFormat) -> Result<Box<dyn StreamReader>> {
        match format {
            StoreFormat::Binary => Ok(Box::new(BinaryStreamReader::open(name, path)?)),
            StoreFormat::Json => Ok(Box::new(JsonStreamReader::open(name, path)?)),
        }
    }

    /// True if a committed catalog for `name` exists under `path`.
    pub fn exists(name: &str, path: &Path) -> bool {
        valid_store_name(name).is_ok() && catalog_path(path, name).is_file()
    }

    /// Format declared by the store's catalog.
    pub fn format(name: &str, path: &Path) -> Result<StoreFormat> {
        Ok(Catalog::load(path, name)?.format)
    }

    /// Deletes the catalog first, then every segment of the store.
    pub fn delete(name: &str, path: &Path) -> Result<()> {
        valid_store_name(name)?;
        let catalog = catalog_path(path, name);
        if !catalog.is_file() {
            return Err(Error::not_found(EntityKind::Store, name));
        }
        fs::remove_file(&catalog)?;
        let removed = purge_files(name, path)?;
        log::debug!(
            "deleted store '{}' at {} ({} files)",
            name,
            path.display(),
            removed + 1
        );
        Ok(())
    }

    fn prepare_create(name: &str, path: &Path) -> Result<()> {
        valid_store_name(name)?;
        fs::create_dir_all(path)?;
        if catalog_path(path, name).exists() {
            return Err(Error::StoreExists(name.to_string()));
        }
        let orphans = purge_files(name, path)?;
        if orphans > 0 {
            log::warn!(
                "removed {} orphan files of uncommitted store '{}' at {}",
                orphans,
                name,
                path.display()
            );
        }
        Ok(())
    }
}

fn valid_store_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::Unsupported("invalid store name"));
    }
    Ok(())
}

/// Removes segment and JSON data files of `name`, leaving the catalog alone.
fn purge_files(name: &str, path: &Path) -> Result<usize> {
    let mut removed = remove_segments(path, name)?;
    match fs::remove_file(json_data_path(path, name)) {
        Ok(()) => removed += 1,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    Ok(removed)
}
