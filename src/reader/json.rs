//! Reader for plain JSON stores.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result, StoreFormat};
use crate::reader::{Record, RecordBody, StreamReader, Subscriptions};
use crate::store::json_writer::{json_data_path, JsonLine};
use crate::store::{Catalog, IndexEntry};

pub struct JsonStreamReader {
    dir: PathBuf,
    catalog: Catalog,
    file: BufReader<File>,
    line: String,
    subscriptions: Subscriptions,
}

impl JsonStreamReader {
    pub fn open(store_name: &str, dir: &Path) -> Result<Self> {
        let catalog = Catalog::load(dir, store_name)?;
        if catalog.format != StoreFormat::Json {
            return Err(Error::FormatMismatch {
                expected: StoreFormat::Json.as_str(),
                found: catalog.format.as_str(),
            });
        }
        let file = File::open(json_data_path(dir, store_name))?;
        log::debug!("opened json store '{}' at {}", store_name, dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            catalog,
            file: BufReader::new(file),
            line: String::new(),
            subscriptions: Subscriptions::default(),
        })
    }
}

impl StreamReader for JsonStreamReader {
    fn store_name(&self) -> &str {
        &self.catalog.store_name
    }

    fn store_path(&self) -> &Path {
        &self.dir
    }

    fn format(&self) -> StoreFormat {
        StoreFormat::Json
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            if self.file.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            let line: JsonLine = serde_json::from_str(text)?;
            return Ok(Some(Record {
                stream_id: line.stream,
                envelope: line.envelope,
                body: RecordBody::Inline(serde_json::to_vec(&line.data)?),
            }));
        }
    }

    fn read_indexed(&self, _entry: &IndexEntry) -> Result<Vec<u8>> {
        Err(Error::Unsupported("json stores have no indexed streams"))
    }

    fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }
}
