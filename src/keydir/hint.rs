//! Hint file
//!
//! Persisted snapshot of the key directory used to skip a full log scan on
//! restart.
//!
//! ## File Format
//! ```text
//! ┌───────────┬─────────────┬──────────────┬────────────────┬─────────────┐
//! │ Magic (4) │ Version (2) │ BodyLen (4)  │ Body (bincode) │ BodyCRC (4) │
//! └───────────┴─────────────┴──────────────┴────────────────┴─────────────┘
//! ```
//!
//! The body records a high-water mark `(active_file_id, active_offset)`: every
//! record at or past that position was written after the snapshot and must be
//! replayed from the datafiles.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::datafile::HINT_FILENAME;
use crate::error::{BytecaskError, Result};

use super::{KeyDir, Meta};

/// Magic bytes identifying a Bytecask hint file
const MAGIC: &[u8; 4] = b"BCKH";

/// Current hint format version
const FORMAT_VERSION: u16 = 1;

/// Magic (4) + Version (2) + BodyLen (4)
const PREAMBLE_SIZE: usize = 10;

/// Serialized key directory plus the log position it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintSnapshot {
    /// Active datafile when the snapshot was taken
    pub active_file_id: u32,

    /// Write offset of that datafile when the snapshot was taken
    pub active_offset: u64,

    /// Live entries, sorted by key
    pub entries: Vec<(String, Meta)>,
}

impl HintSnapshot {
    pub fn new(keydir: &KeyDir, active_file_id: u32, active_offset: u64) -> Self {
        let mut entries: Vec<(String, Meta)> =
            keydir.iter().map(|(k, m)| (k.clone(), *m)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            active_file_id,
            active_offset,
            entries,
        }
    }

    pub fn into_keydir(self) -> KeyDir {
        self.entries.into_iter().collect()
    }

    /// Serialize into the framed on-disk representation
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;

        let mut buf = BytesMut::with_capacity(PREAMBLE_SIZE + body.len() + 4);
        buf.put_slice(MAGIC);
        buf.put_u16(FORMAT_VERSION);
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        buf.put_u32(crc32fast::hash(&body));

        Ok(buf.to_vec())
    }

    /// Parse the framed representation, validating magic, version and checksum
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE_SIZE + 4 {
            return Err(corrupt(format!("hint file truncated at {} bytes", bytes.len())));
        }

        let mut buf = bytes;
        if &buf[..4] != MAGIC {
            return Err(corrupt(format!("invalid hint magic {:?}", &buf[..4])));
        }
        buf.advance(4);

        let version = buf.get_u16();
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported hint version {}", version)));
        }

        let body_len = buf.get_u32() as usize;
        if buf.remaining() != body_len + 4 {
            return Err(corrupt(format!(
                "hint body length {} does not match file ({} bytes remain)",
                body_len,
                buf.remaining()
            )));
        }

        let body = &buf[..body_len];
        buf.advance(body_len);
        let expected = buf.get_u32();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(corrupt(format!(
                "hint checksum mismatch (expected {:#010x}, got {:#010x})",
                expected, actual
            )));
        }

        bincode::deserialize(body).map_err(|e| corrupt(format!("undecodable hint body: {}", e)))
    }
}

/// Atomically replace the hint file in `dir`
///
/// Written to a temporary file, synced, then renamed over the old hint.
pub fn write_hint(dir: &Path, snapshot: &HintSnapshot) -> Result<()> {
    let payload = snapshot.encode()?;
    let path = dir.join(HINT_FILENAME);
    let tmp_path = path.with_extension("db.tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(&payload)?;
    file.sync_all()?;
    fs::rename(&tmp_path, &path)?;

    tracing::debug!(
        "Wrote hint file with {} entries (mark {}@{})",
        snapshot.entries.len(),
        snapshot.active_file_id,
        snapshot.active_offset
    );
    Ok(())
}

/// Load the hint file from `dir`; a missing or corrupt hint is a recovery error
pub fn read_hint(dir: &Path) -> Result<HintSnapshot> {
    let path = dir.join(HINT_FILENAME);
    let bytes = fs::read(&path)
        .map_err(|e| corrupt(format!("cannot read hint file {:?}: {}", path, e)))?;
    HintSnapshot::decode(&bytes)
}

pub fn hint_exists(dir: &Path) -> bool {
    dir.join(HINT_FILENAME).is_file()
}

fn corrupt(msg: String) -> BytecaskError {
    BytecaskError::Recovery(msg)
}
