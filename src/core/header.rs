//! Fixed-size little-endian record headers for data and large segments.
//!
//! Data segment record:
//!
//! ```text
//! 0..4    payload_len       u32
//! 4..8    stream_id         u32
//! 8..16   sequence_id       u64
//! 16..24  originating_time  u64
//! 24..32  time              u64
//! 32..36  source_id         u32
//! 36..38  flags             u16
//! 38..40  reserved          u16
//! 40..44  crc32(payload)    u32
//! 44..48  marker            u32  ('REC0')
//! ```
//!
//! Large segment record: `payload_len u32 | crc32 u32 | stream_id u32 | marker u32`.

use crate::core::{Envelope, Error, Result};

pub const RECORD_HEADER_SIZE: usize = 48;
pub const LARGE_HEADER_SIZE: usize = 16;
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize - 1;

pub const RECORD_MARKER: u32 = 0x3043_4552; // "REC0"
pub const LARGE_MARKER: u32 = 0x3047_524C; // "LRG0"

/// Payload of the record is an encoded [`crate::store::IndexEntry`] that points
/// into a large segment instead of the message itself.
pub const FLAG_INDEXED: u16 = 1;

#[inline]
pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

pub fn crc32(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub payload_len: u32,
    pub stream_id: u32,
    pub envelope: Envelope,
    pub flags: u16,
    pub checksum: u32,
}

impl RecordHeader {
    pub fn new(stream_id: u32, envelope: Envelope, flags: u16, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::Unsupported("payload too large"));
        }
        Ok(Self {
            payload_len: payload.len() as u32,
            stream_id,
            envelope,
            flags,
            checksum: crc32(payload),
        })
    }

    pub fn is_indexed(&self) -> bool {
        self.flags & FLAG_INDEXED != 0
    }

    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.envelope.sequence_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.envelope.originating_time.to_le_bytes());
        buf[24..32].copy_from_slice(&self.envelope.time.to_le_bytes());
        buf[32..36].copy_from_slice(&self.envelope.source_id.to_le_bytes());
        buf[36..38].copy_from_slice(&self.flags.to_le_bytes());
        buf[40..44].copy_from_slice(&self.checksum.to_le_bytes());
        buf[44..48].copy_from_slice(&RECORD_MARKER.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(Error::Corrupt("truncated record header"));
        }
        if le_u32(buf, 44) != RECORD_MARKER {
            return Err(Error::Corrupt("record marker mismatch"));
        }
        Ok(Self {
            payload_len: le_u32(buf, 0),
            stream_id: le_u32(buf, 4),
            envelope: Envelope {
                sequence_id: le_u64(buf, 8),
                originating_time: le_u64(buf, 16),
                time: le_u64(buf, 24),
                source_id: le_u32(buf, 32),
            },
            flags: le_u16(buf, 36),
            checksum: le_u32(buf, 40),
        })
    }

    pub fn validate_crc(&self, payload: &[u8]) -> Result<()> {
        if crc32(payload) == self.checksum {
            Ok(())
        } else {
            Err(Error::Corrupt("crc mismatch"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeHeader {
    pub payload_len: u32,
    pub checksum: u32,
    pub stream_id: u32,
}

impl LargeHeader {
    pub fn new(stream_id: u32, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::Unsupported("payload too large"));
        }
        Ok(Self {
            payload_len: payload.len() as u32,
            checksum: crc32(payload),
            stream_id,
        })
    }

    pub fn to_bytes(&self) -> [u8; LARGE_HEADER_SIZE] {
        let mut buf = [0u8; LARGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[12..16].copy_from_slice(&LARGE_MARKER.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < LARGE_HEADER_SIZE {
            return Err(Error::Corrupt("truncated large header"));
        }
        if le_u32(buf, 12) != LARGE_MARKER {
            return Err(Error::Corrupt("large record marker mismatch"));
        }
        Ok(Self {
            payload_len: le_u32(buf, 0),
            checksum: le_u32(buf, 4),
            stream_id: le_u32(buf, 8),
        })
    }
}
