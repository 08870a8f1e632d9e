//! Reader for multiplexed binary stores.
//!
//! Sealed segments are memory-mapped for the lifetime of the reader and
//! stitched back into one record sequence in segment order.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::core::header::{LargeHeader, RecordHeader, LARGE_HEADER_SIZE, RECORD_HEADER_SIZE};
use crate::core::segment::{segment_path, SegmentHeader, SegmentKind, SEG_HEADER_SIZE};
use crate::core::{Error, Result, StoreFormat};
use crate::reader::{Record, RecordBody, StreamReader, Subscriptions};
use crate::store::{Catalog, IndexEntry};

pub struct BinaryStreamReader {
    dir: PathBuf,
    catalog: Catalog,
    data: Vec<Mmap>,
    large: Vec<Mmap>,
    segment: usize,
    offset: usize,
    subscriptions: Subscriptions,
}

impl BinaryStreamReader {
    pub fn open(store_name: &str, dir: &Path) -> Result<Self> {
        let catalog = Catalog::load(dir, store_name)?;
        if catalog.format != StoreFormat::Binary {
            return Err(Error::FormatMismatch {
                expected: StoreFormat::Binary.as_str(),
                found: catalog.format.as_str(),
            });
        }
        let data = map_segments(dir, store_name, SegmentKind::Data, catalog.data_segments)?;
        let large = map_segments(dir, store_name, SegmentKind::Large, catalog.large_segments)?;
        log::debug!(
            "opened binary store '{}' at {} ({} data, {} large segments)",
            store_name,
            dir.display(),
            data.len(),
            large.len()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            catalog,
            data,
            large,
            segment: 0,
            offset: SEG_HEADER_SIZE,
            subscriptions: Subscriptions::default(),
        })
    }
}

fn map_segments(dir: &Path, store_name: &str, kind: SegmentKind, count: u32) -> Result<Vec<Mmap>> {
    let mut maps = Vec::with_capacity(count as usize);
    for id in 0..count {
        let file = File::open(segment_path(dir, store_name, id, kind))?;
        // SAFETY: segments listed in a catalog are sealed by commit and never
        // truncated or rewritten while a reader maps them.
        let map = unsafe { MmapOptions::new().map(&file)? };
        SegmentHeader::validate(&map, id, kind)?;
        maps.push(map);
    }
    Ok(maps)
}

impl StreamReader for BinaryStreamReader {
    fn store_name(&self) -> &str {
        &self.catalog.store_name
    }

    fn store_path(&self) -> &Path {
        &self.dir
    }

    fn format(&self) -> StoreFormat {
        StoreFormat::Binary
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn rewind(&mut self) -> Result<()> {
        self.segment = 0;
        self.offset = SEG_HEADER_SIZE;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(map) = self.data.get(self.segment) else {
                return Ok(None);
            };
            if self.offset >= map.len() {
                self.segment += 1;
                self.offset = SEG_HEADER_SIZE;
                continue;
            }
            if self.offset + RECORD_HEADER_SIZE > map.len() {
                return Err(Error::Corrupt("truncated record header"));
            }
            let header = RecordHeader::from_bytes(&map[self.offset..self.offset + RECORD_HEADER_SIZE])?;
            let start = self.offset + RECORD_HEADER_SIZE;
            let end = start + header.payload_len as usize;
            if end > map.len() {
                return Err(Error::Corrupt("truncated record payload"));
            }
            let payload = &map[start..end];
            header.validate_crc(payload)?;
            self.offset = end;

            let body = if header.is_indexed() {
                RecordBody::Indexed(IndexEntry::from_bytes(payload)?)
            } else {
                RecordBody::Inline(payload.to_vec())
            };
            return Ok(Some(Record {
                stream_id: header.stream_id,
                envelope: header.envelope,
                body,
            }));
        }
    }

    fn read_indexed(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let map = self
            .large
            .get(entry.segment as usize)
            .ok_or(Error::Corrupt("index entry names a missing segment"))?;
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        if start < SEG_HEADER_SIZE || end > map.len() || (entry.len as usize) < LARGE_HEADER_SIZE {
            return Err(Error::Corrupt("index entry out of bounds"));
        }
        let header = LargeHeader::from_bytes(&map[start..start + LARGE_HEADER_SIZE])?;
        let payload = &map[start + LARGE_HEADER_SIZE..end];
        if payload.len() != header.payload_len as usize {
            return Err(Error::Corrupt("index entry length mismatch"));
        }
        if crate::core::header::crc32(payload) != header.checksum {
            return Err(Error::Corrupt("crc mismatch"));
        }
        Ok(payload.to_vec())
    }

    fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }
}
