//! Datafile Module
//!
//! Append-only log segments holding every write ever made to the store.
//!
//! ## Responsibilities
//! - Encode/decode records with a fixed big-endian header
//! - Append records to the active file, read them back positionally
//! - Track when the active file is full enough to rotate
//! - Map file ids to open handles
//!
//! ## Record Format
//! ```text
//! ┌──────────────┬───────────────┬─────────────┬─────────────┬─────┬───────┐
//! │ Checksum (4) │ Timestamp (4) │ KeyLen (4)  │ ValLen (4)  │ Key │ Value │
//! └──────────────┴───────────────┴─────────────┴─────────────┴─────┴───────┘
//! ```
//!
//! - Checksum is the CRC-32 of the value bytes
//! - Timestamp == 0 marks a padding slot (skipped by recovery scans)
//! - ValLen == 0 marks a tombstone (deleted key)

mod directory;
mod file;
mod record;

pub use directory::{datafile_path, parse_datafile_id, FileDir, HINT_FILENAME};
pub use file::Datafile;
pub use record::{encode_record, now_secs, Header, Record, HEADER_SIZE};
