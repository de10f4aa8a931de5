//! Startup recovery
//!
//! Rebuilds the file directory and key directory from a generation directory.
//!
//! ## Steps
//! 1. Open a read handle for every `data_<id>.db`, tracking the highest id
//! 2. Rebuild the key directory from the hint file (plus the log tail written
//!    after it) or from a full scan of every datafile
//! 3. The caller opens a fresh active datafile with id `max + 1`

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::{Config, RecoveryMode};
use crate::datafile::{datafile_path, parse_datafile_id, Datafile, FileDir, Header, Record};
use crate::datafile::{HEADER_SIZE, HINT_FILENAME};
use crate::error::{BytecaskError, Result};
use crate::keydir::hint::{hint_exists, read_hint};
use crate::keydir::{KeyDir, Meta};

/// Where the recovered key directory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// No datafiles existed
    Empty,
    /// Hint file plus the log tail past its high-water mark
    Hint,
    /// Every record of every datafile
    Scan,
}

/// Result of a recovery pass
#[derive(Debug)]
pub struct Recovered {
    pub filedir: FileDir,
    pub keydir: KeyDir,
    /// Highest datafile id seen on disk (0 when there are none)
    pub max_file_id: u32,
    pub source: RecoverySource,
}

/// Recover the datafiles and key directory stored in `dir`
pub fn recover(dir: &Path, config: &Config) -> Result<Recovered> {
    let (filedir, max_file_id) = open_datafiles(dir, config)?;

    if filedir.is_empty() && !hint_exists(dir) {
        return Ok(Recovered {
            filedir,
            keydir: KeyDir::new(),
            max_file_id,
            source: RecoverySource::Empty,
        });
    }

    let (keydir, source) = match config.recovery_mode {
        RecoveryMode::Scan => (scan_all(&filedir, config), RecoverySource::Scan),
        RecoveryMode::Hint => (load_from_hint(dir, &filedir, config)?, RecoverySource::Hint),
        RecoveryMode::Auto if hint_exists(dir) => match load_from_hint(dir, &filedir, config) {
            Ok(keydir) => (keydir, RecoverySource::Hint),
            Err(e) => {
                tracing::warn!("Hint file unusable ({}), falling back to a full scan", e);
                (scan_all(&filedir, config), RecoverySource::Scan)
            }
        },
        RecoveryMode::Auto => (scan_all(&filedir, config), RecoverySource::Scan),
    };

    tracing::info!(
        "Recovered {} keys from {} datafiles via {:?}",
        keydir.len(),
        filedir.len(),
        source
    );

    Ok(Recovered {
        filedir,
        keydir,
        max_file_id,
        source,
    })
}

/// Open a read handle for every datafile in `dir`
///
/// Unrecognized files are logged and skipped. Each datafile gets
/// `open_retries` attempts; more than `max_recovery_errors` unopenable files
/// fail the whole recovery.
fn open_datafiles(dir: &Path, config: &Config) -> Result<(FileDir, u32)> {
    let mut filedir = FileDir::new();
    let mut max_file_id = 0u32;
    let mut failures = 0u32;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if !entry.file_type()?.is_file() {
            tracing::warn!("Skipping unexpected entry {:?} in {:?}", name, dir);
            continue;
        }
        if name == HINT_FILENAME {
            continue;
        }
        let id = match parse_datafile_id(&name) {
            Some(id) => id,
            None => {
                tracing::warn!("Skipping file with unrecognized name {:?}", name);
                continue;
            }
        };
        max_file_id = max_file_id.max(id);

        match open_with_retries(&datafile_path(dir, id), id, config.open_retries) {
            Ok(datafile) => {
                filedir.insert(Arc::new(datafile));
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Failed to open datafile {:?}: {}", name, e);
                if failures > config.max_recovery_errors {
                    return Err(BytecaskError::Recovery(format!(
                        "{} datafiles could not be opened (limit {}), last: {:?}: {}",
                        failures, config.max_recovery_errors, name, e
                    )));
                }
            }
        }
    }

    Ok((filedir, max_file_id))
}

fn open_with_retries(path: &Path, id: u32, attempts: u32) -> Result<Datafile> {
    let mut attempt = 1;
    loop {
        match Datafile::open_read_only(path, id) {
            Ok(datafile) => return Ok(datafile),
            Err(e) if attempt < attempts => {
                tracing::debug!("Open of {:?} failed (attempt {}): {}", path, attempt, e);
                thread::sleep(Duration::from_millis(10 * attempt as u64));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Load the hint snapshot, then replay every record past its high-water mark
fn load_from_hint(dir: &Path, filedir: &FileDir, config: &Config) -> Result<KeyDir> {
    let hint = read_hint(dir)?;

    if let Some((key, meta)) = hint.entries.iter().find(|(_, m)| !filedir.contains(m.file_id)) {
        return Err(BytecaskError::Recovery(format!(
            "hint entry {:?} references missing datafile {}",
            key, meta.file_id
        )));
    }

    let mark_id = hint.active_file_id;
    let mark_offset = hint.active_offset;
    let mut keydir = hint.into_keydir();

    for datafile in filedir.iter().filter(|df| df.id() >= mark_id) {
        let start = if datafile.id() == mark_id { mark_offset } else { 0 };
        if start > datafile.size() {
            return Err(BytecaskError::Recovery(format!(
                "hint mark {} lies past the end of datafile {} ({} bytes)",
                start,
                datafile.id(),
                datafile.size()
            )));
        }
        scan_file(datafile, start, &mut keydir, config.max_scan_errors);
    }

    Ok(keydir)
}

/// Rebuild the key directory from every datafile, oldest first
fn scan_all(filedir: &FileDir, config: &Config) -> KeyDir {
    let mut keydir = KeyDir::new();
    for datafile in filedir.iter() {
        scan_file(datafile, 0, &mut keydir, config.max_scan_errors);
    }
    keydir
}

/// Walk the records of one datafile from `start`, applying each to `keydir`
///
/// Later records overwrite earlier ones and tombstones remove the key. Padding
/// slots (timestamp 0) advance by one header. A record running past the end of
/// the file is a torn write and ends the scan; read and checksum failures are
/// tolerated up to `max_errors`.
pub(crate) fn scan_file(datafile: &Datafile, start: u64, keydir: &mut KeyDir, max_errors: u32) {
    let len = datafile.size();
    let mut offset = start;
    let mut errors = 0u32;

    let mut note_error = |offset: u64, e: &BytecaskError| -> bool {
        errors += 1;
        tracing::warn!(
            "Scan error in datafile {} at offset {}: {} ({} of {} tolerated)",
            datafile.id(),
            offset,
            e,
            errors,
            max_errors
        );
        errors <= max_errors
    };

    while offset < len {
        if len - offset < HEADER_SIZE as u64 {
            tracing::warn!(
                "Torn header at end of datafile {} ({} trailing bytes)",
                datafile.id(),
                len - offset
            );
            break;
        }

        let header = match datafile.read(offset, HEADER_SIZE as u64) {
            Ok(bytes) => match Header::decode(&bytes) {
                Ok(header) => header,
                Err(e) => {
                    if !note_error(offset, &e) {
                        break;
                    }
                    continue;
                }
            },
            Err(e) => {
                if !note_error(offset, &e) {
                    break;
                }
                continue;
            }
        };

        if header.is_padding() {
            offset += HEADER_SIZE as u64;
            continue;
        }

        let size = header.record_size();
        if offset + size > len {
            tracing::warn!(
                "Torn record at offset {} of datafile {} (needs {} bytes, {} remain)",
                offset,
                datafile.id(),
                size,
                len - offset
            );
            break;
        }

        let (meta_offset, meta_size) = match (u32::try_from(offset), u32::try_from(size)) {
            (Ok(o), Ok(s)) => (o, s),
            _ => {
                tracing::warn!(
                    "Datafile {} exceeds the addressable range at offset {}",
                    datafile.id(),
                    offset
                );
                break;
            }
        };

        let record = match datafile.read(offset, size).and_then(|bytes| Record::decode(&bytes)) {
            Ok(record) => record,
            Err(e @ BytecaskError::Io(_)) => {
                if !note_error(offset, &e) {
                    break;
                }
                continue;
            }
            Err(e) => {
                if !note_error(offset, &e) {
                    break;
                }
                offset += size;
                continue;
            }
        };

        if record.is_tombstone() {
            keydir.remove(&record.key);
        } else {
            keydir.insert(
                record.key,
                Meta {
                    timestamp: header.timestamp,
                    offset: meta_offset,
                    record_size: meta_size,
                    file_id: datafile.id(),
                },
            );
        }
        offset += size;
    }
}
