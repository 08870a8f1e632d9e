//! Segment file naming, headers and the rolling segment writer.
//!
//! A store named `trial` keeps its numbered segments next to its catalog:
//!
//! ```text
//! {store_path}/
//!   trial.catalog.json
//!   trial.000000.data     <- multiplexed records, segment 0
//!   trial.000001.data     <- after rollover
//!   trial.000000.large    <- payloads of large streams
//! ```
//!
//! Segments are append-only. Existence of a store is decided by its catalog,
//! so a segment without a catalog is an orphan left by an aborted writer.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::header::le_u32;
use crate::core::{Error, Result};

/// Size of the header at the start of every segment file.
pub const SEG_HEADER_SIZE: usize = 64;

/// Segment magic number ('SEG0').
pub const SEG_MAGIC: u32 = 0x5345_4730;

pub const SEG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Multiplexed message records.
    Data,
    /// Out-of-line payloads of large streams, addressed by index entries.
    Large,
}

impl SegmentKind {
    pub fn extension(&self) -> &'static str {
        match self {
            SegmentKind::Data => "data",
            SegmentKind::Large => "large",
        }
    }

    fn code(&self) -> u32 {
        match self {
            SegmentKind::Data => 1,
            SegmentKind::Large => 2,
        }
    }
}

/// Segment header stored at the beginning of each segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u32,
    pub segment_id: u32,
    pub kind: u32,
}

impl SegmentHeader {
    pub fn new(segment_id: u32, kind: SegmentKind) -> Self {
        Self {
            magic: SEG_MAGIC,
            version: SEG_VERSION,
            segment_id,
            kind: kind.code(),
        }
    }

    pub fn to_bytes(&self) -> [u8; SEG_HEADER_SIZE] {
        let mut buf = [0u8; SEG_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.segment_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.kind.to_le_bytes());
        buf
    }

    /// Parses and validates a header against the expected id and kind.
    pub fn validate(buf: &[u8], segment_id: u32, kind: SegmentKind) -> Result<Self> {
        if buf.len() < SEG_HEADER_SIZE {
            return Err(Error::Corrupt("segment shorter than header"));
        }
        let header = Self {
            magic: le_u32(buf, 0),
            version: le_u32(buf, 4),
            segment_id: le_u32(buf, 8),
            kind: le_u32(buf, 12),
        };
        if header.magic != SEG_MAGIC {
            return Err(Error::Corrupt("segment magic mismatch"));
        }
        if header.version != SEG_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }
        if header.segment_id != segment_id {
            return Err(Error::Corrupt("segment id mismatch"));
        }
        if header.kind != kind.code() {
            return Err(Error::Corrupt("segment kind mismatch"));
        }
        Ok(header)
    }
}

// ============================================================================
// Segment Naming
// ============================================================================

/// Generate segment filename (e.g., "trial.000042.data").
pub fn segment_filename(store_name: &str, id: u32, kind: SegmentKind) -> String {
    format!("{store_name}.{id:06}.{}", kind.extension())
}

pub fn segment_path(dir: &Path, store_name: &str, id: u32, kind: SegmentKind) -> PathBuf {
    dir.join(segment_filename(store_name, id, kind))
}

/// Returns the segment id if `file_name` is a segment of `store_name`.
pub fn parse_segment_filename(file_name: &str, store_name: &str, kind: SegmentKind) -> Option<u32> {
    let rest = file_name.strip_prefix(store_name)?.strip_prefix('.')?;
    let digits = rest.strip_suffix(kind.extension())?.strip_suffix('.')?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok()
}

/// Discover all segment ids of one kind for a store. Sorted ascending.
pub fn discover_segments(dir: &Path, store_name: &str, kind: SegmentKind) -> Result<Vec<u32>> {
    let mut segments = Vec::new();
    if !dir.is_dir() {
        return Ok(segments);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(id) = parse_segment_filename(name, store_name, kind) {
            segments.push(id);
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

/// Remove every segment (both kinds) belonging to `store_name`.
///
/// Returns the number of files removed.
pub fn remove_segments(dir: &Path, store_name: &str) -> Result<usize> {
    let mut removed = 0;
    for kind in [SegmentKind::Data, SegmentKind::Large] {
        for id in discover_segments(dir, store_name, kind)? {
            match fs::remove_file(segment_path(dir, store_name, id, kind)) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(removed)
}

// ============================================================================
// Rolling Writer
// ============================================================================

/// Append-only writer over a numbered run of segments of one kind.
///
/// Starts a new segment when the next record would push the active one past
/// `segment_size`. A record larger than a whole segment gets a segment of its
/// own rather than failing.
pub struct SegmentWriter {
    dir: PathBuf,
    store_name: String,
    kind: SegmentKind,
    segment_size: u64,
    segment_id: u32,
    file: Option<BufWriter<File>>,
    write_offset: u64,
    has_records: bool,
    created: Vec<PathBuf>,
}

impl SegmentWriter {
    /// The first segment is created lazily on the first append.
    pub fn new(dir: impl Into<PathBuf>, store_name: &str, kind: SegmentKind, segment_size: u64) -> Self {
        Self {
            dir: dir.into(),
            store_name: store_name.to_string(),
            kind,
            segment_size,
            segment_id: 0,
            file: None,
            write_offset: SEG_HEADER_SIZE as u64,
            has_records: false,
            created: Vec::new(),
        }
    }

    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    /// Number of segment files created so far.
    pub fn segment_count(&self) -> u32 {
        self.created.len() as u32
    }

    pub fn needs_roll(&self, record_len: usize) -> bool {
        self.has_records && self.write_offset + record_len as u64 > self.segment_size
    }

    /// Append one record made of `parts`. Returns `(segment_id, offset)` of the
    /// record start.
    pub fn append(&mut self, parts: &[&[u8]]) -> Result<(u32, u64)> {
        let record_len: usize = parts.iter().map(|part| part.len()).sum();

        if self.file.is_none() {
            self.open_segment(self.segment_id)?;
        } else if self.needs_roll(record_len) {
            self.roll()?;
        }

        let offset = self.write_offset;
        let file = self
            .file
            .as_mut()
            .ok_or(Error::Corrupt("segment file missing"))?;
        for part in parts {
            file.write_all(part)?;
        }
        self.write_offset += record_len as u64;
        self.has_records = true;
        Ok((self.segment_id, offset))
    }

    /// Seal the active segment and start the next one.
    pub fn roll(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let next = self
            .segment_id
            .checked_add(1)
            .ok_or(Error::Unsupported("segment id overflow"))?;
        log::debug!(
            "rolling {} segment of store '{}' to {}",
            self.kind.extension(),
            self.store_name,
            next
        );
        self.open_segment(next)
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush (and optionally fsync) the active segment and close it.
    pub fn finish(&mut self, sync: bool) -> Result<u32> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            if sync {
                file.get_ref().sync_all()?;
            }
        }
        Ok(self.segment_count())
    }

    /// Close and delete every segment this writer created.
    pub fn abort(&mut self) -> Result<()> {
        self.file = None;
        for path in self.created.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn open_segment(&mut self, id: u32) -> Result<()> {
        let path = segment_path(&self.dir, &self.store_name, id, self.kind);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        self.created.push(path);
        let mut file = BufWriter::new(file);
        file.write_all(&SegmentHeader::new(id, self.kind).to_bytes())?;
        self.file = Some(file);
        self.segment_id = id;
        self.write_offset = SEG_HEADER_SIZE as u64;
        self.has_records = false;
        Ok(())
    }
}
