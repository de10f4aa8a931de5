//! Record codec
//!
//! Encodes and decodes the fixed 16-byte record header plus the raw key and
//! value bytes that follow it.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};

use crate::error::{BytecaskError, Result};

/// Header size: Checksum (4) + Timestamp (4) + KeyLen (4) + ValLen (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// Fixed-size record header, stored big-endian on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// CRC-32 (IEEE) of the value bytes
    pub checksum: u32,

    /// Write time in unix seconds; zero marks a padding slot
    pub timestamp: u32,

    /// Length of the key in bytes
    pub key_len: u32,

    /// Length of the value in bytes; zero marks a tombstone
    pub val_len: u32,
}

impl Header {
    /// Build the header for a key/value pair written at `timestamp`
    pub fn new(key: &[u8], value: &[u8], timestamp: u32) -> Self {
        Self {
            checksum: crc32fast::hash(value),
            timestamp,
            key_len: key.len() as u32,
            val_len: value.len() as u32,
        }
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BytecaskError::CorruptHeader(format!(
                "expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        Ok(Self {
            checksum: buf.get_u32(),
            timestamp: buf.get_u32(),
            key_len: buf.get_u32(),
            val_len: buf.get_u32(),
        })
    }

    /// Append the big-endian header fields to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.checksum);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.key_len);
        buf.put_u32(self.val_len);
    }

    /// Full encoded length: header + key + value
    pub fn record_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.key_len as u64 + self.val_len as u64
    }

    pub fn is_padding(&self) -> bool {
        self.timestamp == 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.val_len == 0
    }

    /// Verify `value` against the stored checksum
    pub fn verify(&self, value: &[u8]) -> Result<()> {
        let actual = crc32fast::hash(value);
        if actual != self.checksum {
            return Err(BytecaskError::CorruptRecord {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

/// Encode a full record (header, key, value) into `buf`
///
/// No delimiters are written; the header lengths are authoritative.
pub fn encode_record<B: BufMut>(buf: &mut B, header: &Header, key: &[u8], value: &[u8]) {
    header.encode(buf);
    buf.put_slice(key);
    buf.put_slice(value);
}

/// A fully decoded and checksum-verified record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub key: String,
    pub value: Vec<u8>,
}

impl Record {
    /// Decode a complete record from `bytes`
    ///
    /// Fails if the byte count disagrees with the header lengths, if the key is
    /// not UTF-8, or if the value does not match its checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = Header::decode(bytes)?;
        let expected = header.record_size();
        if bytes.len() as u64 != expected {
            return Err(BytecaskError::CorruptHeader(format!(
                "header describes {} bytes, record has {}",
                expected,
                bytes.len()
            )));
        }

        let key_end = HEADER_SIZE + header.key_len as usize;
        let key = std::str::from_utf8(&bytes[HEADER_SIZE..key_end])
            .map_err(|e| BytecaskError::CorruptKey(e.to_string()))?
            .to_string();
        let value = &bytes[key_end..];
        header.verify(value)?;

        Ok(Self {
            header,
            key,
            value: value.to_vec(),
        })
    }

    pub fn is_tombstone(&self) -> bool {
        self.header.is_tombstone()
    }
}

/// Current wall-clock time in unix seconds, never zero
///
/// Zero is reserved for padding slots, so a clock reading before the epoch is
/// clamped to one.
pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
        .max(1)
}
