//! KeyDir Module
//!
//! In-memory index from key to the location of its latest record.
//!
//! ## Responsibilities
//! - Answer "does this key exist" (absent keys do not exist, whatever bytes
//!   remain on disk)
//! - Locate the latest record: file id, offset, encoded size
//! - Persist/restore snapshots through the hint file
//!
//! ## Data Structure Choice
//! Using a HashMap guarded by the store's state lock:
//! - Point lookups only (range queries are not supported)
//! - One entry per key; overwrites replace the entry in place

pub mod hint;
mod table;

use serde::{Deserialize, Serialize};

use crate::datafile::HEADER_SIZE;

pub use hint::HintSnapshot;
pub use table::KeyDir;

/// Location metadata for one key's latest record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Write time of the record (unix seconds)
    pub timestamp: u32,

    /// Byte offset of the record within its datafile
    pub offset: u32,

    /// Full encoded record length (header + key + value); zero means absent
    pub record_size: u32,

    /// Datafile holding the record
    pub file_id: u32,
}

impl Meta {
    /// A present entry must at least cover a record header
    pub fn is_live(&self) -> bool {
        self.record_size as usize >= HEADER_SIZE
    }
}
