//! Compaction
//!
//! Rewrites every live record into a single fresh datafile in a new
//! generation, then swaps the generation pointer.
//!
//! ## State Machine
//! ```text
//! Idle → Preparing → Rewriting → Swapping → Cleanup → Idle
//!            │           │           │
//!            └───────────┴───────────┴──→ Aborted (live state untouched)
//! ```
//!
//! - Preparing: reset the staging directory, create compacted datafile 1
//! - Rewriting: copy each record of a key directory snapshot (no locks held)
//! - Swapping: under the write lock, copy records written since the snapshot,
//!   write the hint, rename staging to the next generation and commit by
//!   replacing `CURRENT`; then install the new index and active datafile 2
//! - Cleanup: remove the retired generation directory

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::datafile::{datafile_path, Datafile, FileDir, Record};
use crate::error::{BytecaskError, Result};
use crate::keydir::hint::write_hint;
use crate::keydir::{HintSnapshot, KeyDir, Meta};

use super::{full_at, layout, Store};

/// Id of the datafile holding compacted records in a new generation
const COMPACTED_FILE_ID: u32 = 1;

/// Phase of the compaction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    Idle,
    Preparing,
    Rewriting,
    Swapping,
    Cleanup,
    /// The last run failed; live state was left untouched
    Aborted,
}

/// Summary of a completed compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Live keys in the compacted generation
    pub live_keys: usize,
    /// Keys written while the rewrite ran, copied during the swap
    pub caught_up: usize,
    /// Datafiles in the retired generation
    pub files_before: usize,
    /// Datafile bytes in the retired generation
    pub bytes_before: u64,
    /// Bytes in the compacted datafile
    pub bytes_after: u64,
    /// Number of the new live generation
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Fewer than two datafiles; nothing to do
    Skipped,
    Completed(CompactionStats),
}

impl Store {
    /// Compact the live generation
    ///
    /// Failures abort without touching the live state and surface as
    /// `CompactionAborted`.
    pub fn compact(&self) -> Result<CompactionOutcome> {
        let _maintenance = self.maintenance.lock();
        self.ensure_running()?;

        let file_count = self.state.lock().filedir.len();
        if file_count < 2 {
            tracing::info!("Only {} datafile exists, skipping compaction", file_count);
            return Ok(CompactionOutcome::Skipped);
        }

        tracing::info!("Compaction started ({} datafiles)", file_count);
        let staging = layout::staging_dir(&self.config.data_dir);

        match self.run_compaction(&staging) {
            Ok(stats) => {
                self.set_compaction_state(CompactionState::Idle);
                tracing::info!(
                    "Compaction done: {} keys, {} -> {} bytes, generation {}",
                    stats.live_keys,
                    stats.bytes_before,
                    stats.bytes_after,
                    stats.generation
                );
                Ok(CompactionOutcome::Completed(stats))
            }
            Err(e) => {
                self.set_compaction_state(CompactionState::Aborted);
                tracing::error!("Compaction aborted: {}", e);
                if let Err(cleanup) = layout::remove_dir_if_exists(&staging) {
                    tracing::warn!("Failed to remove compaction staging directory: {}", cleanup);
                }
                Err(match e {
                    BytecaskError::CompactionAborted(_) => e,
                    other => BytecaskError::CompactionAborted(other.to_string()),
                })
            }
        }
    }

    fn run_compaction(&self, staging: &Path) -> Result<CompactionStats> {
        let root = self.config.data_dir.clone();

        // ---------------------------------------------------------------------
        // Preparing
        // ---------------------------------------------------------------------
        self.set_compaction_state(CompactionState::Preparing);
        layout::remove_dir_if_exists(staging)?;
        fs::create_dir_all(staging)?;
        let compacted = Arc::new(Datafile::create(
            &datafile_path(staging, COMPACTED_FILE_ID),
            COMPACTED_FILE_ID,
            full_at(&self.config),
        )?);

        // ---------------------------------------------------------------------
        // Rewriting
        // ---------------------------------------------------------------------
        self.set_compaction_state(CompactionState::Rewriting);
        let (snapshot, source_files) = {
            let state = self.state.lock();
            (state.keydir.clone(), state.filedir.clone())
        };
        let files_before = source_files.len();
        let bytes_before = source_files.total_size();

        let mut rewritten = KeyDir::new();
        for (key, meta) in snapshot.iter() {
            if self.cancel.load(Ordering::Acquire) {
                return Err(BytecaskError::CompactionAborted("shutdown requested".to_string()));
            }
            copy_record(key, meta, &source_files, &compacted, &mut rewritten)?;
        }

        // ---------------------------------------------------------------------
        // Swapping
        // ---------------------------------------------------------------------
        self.set_compaction_state(CompactionState::Swapping);
        let write_guard = self.write_lock.lock();

        let (current, current_files, old_generation) = {
            let state = self.state.lock();
            (state.keydir.clone(), state.filedir.clone(), state.generation.clone())
        };

        let mut caught_up = 0;
        for (key, meta) in current.iter() {
            if snapshot.get(key) != Some(meta) {
                copy_record(key, meta, &current_files, &compacted, &mut rewritten)?;
                caught_up += 1;
            }
        }
        let deleted: Vec<String> = rewritten
            .keys()
            .filter(|key| !current.contains(key))
            .cloned()
            .collect();
        for key in &deleted {
            rewritten.remove(key);
        }

        compacted.flush()?;
        write_hint(
            staging,
            &HintSnapshot::new(&rewritten, COMPACTED_FILE_ID, compacted.size()),
        )?;

        let new_generation = old_generation.successor(&root);
        layout::remove_dir_if_exists(&new_generation.path)?;

        let mut state = self.state.lock();
        fs::rename(staging, &new_generation.path)?;
        let committed = layout::sync_dir(&root)
            .and_then(|()| layout::write_current(&root, &new_generation));
        if let Err(e) = committed {
            // CURRENT still names the old generation
            if let Err(cleanup) = layout::remove_dir_if_exists(&new_generation.path) {
                tracing::warn!("Failed to remove uncommitted generation: {}", cleanup);
            }
            return Err(e);
        }
        if let Err(e) = layout::sync_dir(&root) {
            tracing::warn!("Failed to sync data directory after swap: {}", e);
        }

        let active = match Datafile::create(
            &datafile_path(&new_generation.path, COMPACTED_FILE_ID + 1),
            COMPACTED_FILE_ID + 1,
            full_at(&self.config),
        ) {
            Ok(datafile) => Arc::new(datafile),
            Err(e) => {
                tracing::error!(
                    "Failed to create a new active datafile, keeping the compacted file active: {}",
                    e
                );
                Arc::clone(&compacted)
            }
        };

        let mut filedir = FileDir::new();
        filedir.insert(Arc::clone(&compacted));
        filedir.insert(Arc::clone(&active));

        let stats = CompactionStats {
            live_keys: rewritten.len(),
            caught_up,
            files_before,
            bytes_before,
            bytes_after: compacted.size(),
            generation: new_generation.number,
        };

        let retired = std::mem::replace(&mut state.filedir, filedir);
        state.keydir = rewritten;
        state.active_id = active.id();
        state.active = active;
        state.generation = new_generation;
        retired.close_all();

        drop(state);
        drop(write_guard);

        // ---------------------------------------------------------------------
        // Cleanup
        // ---------------------------------------------------------------------
        self.set_compaction_state(CompactionState::Cleanup);
        if let Err(e) = layout::remove_dir_if_exists(&old_generation.path) {
            tracing::warn!("Failed to remove retired generation {:?}: {}", old_generation.path, e);
        }

        Ok(stats)
    }

    fn set_compaction_state(&self, next: CompactionState) {
        let mut state = self.compaction_state.lock();
        tracing::debug!("Compaction {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Copy the record `meta` points at into `target`, indexing the new location
///
/// Tombstones are dropped: the compacted generation replaces every older file.
fn copy_record(
    key: &str,
    meta: &Meta,
    files: &FileDir,
    target: &Datafile,
    keydir: &mut KeyDir,
) -> Result<()> {
    let source = files.get(meta.file_id).ok_or_else(|| {
        BytecaskError::CompactionAborted(format!(
            "datafile {} holding {:?} is not open",
            meta.file_id, key
        ))
    })?;

    let bytes = source.read(meta.offset as u64, meta.record_size as u64)?;
    let record = Record::decode(&bytes)?;
    if record.key != key {
        return Err(BytecaskError::CorruptKey(format!(
            "expected {:?} at {}@{}, found {:?}",
            key, meta.file_id, meta.offset, record.key
        )));
    }
    if record.is_tombstone() {
        tracing::debug!("Dropping tombstone for {:?}", key);
        return Ok(());
    }

    if target.size() + bytes.len() as u64 > u32::MAX as u64 {
        return Err(BytecaskError::CompactionAborted(
            "compacted datafile exceeds the addressable range".to_string(),
        ));
    }
    let offset = target.append(&bytes)?;

    keydir.insert(
        key.to_string(),
        Meta {
            offset: offset as u32,
            file_id: COMPACTED_FILE_ID,
            ..*meta
        },
    );
    Ok(())
}
