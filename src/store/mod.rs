//! Store Module
//!
//! The storage engine façade combining datafiles, the file directory and the
//! key directory.
//!
//! ## Responsibilities
//! - Recover state on startup
//! - Serve get/set/delete against the key directory and datafiles
//! - Own the locking discipline shared with the maintenance loops
//! - Persist the key directory (hint file), rotate and compact datafiles

mod compaction;
mod layout;
mod maintenance;
mod recovery;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;

use crate::config::Config;
use crate::datafile::{datafile_path, encode_record, now_secs, Datafile, FileDir, Header, Record};
use crate::error::{BytecaskError, Result};
use crate::keydir::hint::write_hint;
use crate::keydir::{HintSnapshot, KeyDir, Meta};
use crate::protocol::Command;

pub use compaction::{CompactionOutcome, CompactionState, CompactionStats};
pub use layout::Generation;
pub use maintenance::Maintenance;
pub use recovery::RecoverySource;

/// Scratch buffers kept for reuse by `set`/`delete`
const BUFFER_POOL_SIZE: usize = 16;

/// Buffers that grew past this are dropped instead of pooled
const MAX_POOLED_BUFFER: usize = 1024 * 1024;

/// Re-resolutions attempted when a read lands on a retired datafile
const STALE_READ_RETRIES: usize = 3;

/// State guarded by the store's shared lock
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) keydir: KeyDir,
    pub(crate) filedir: FileDir,
    pub(crate) active: Arc<Datafile>,
    pub(crate) active_id: u32,
    pub(crate) generation: Generation,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// - `state`: the shared lock over {KeyDir, FileDir, active datafile, active
///   id, generation}. Held only for index lookups and pointer swaps; datafile
///   I/O runs outside it on reference-counted handles.
/// - `write_lock`: serializes appends (set/delete) with the hint snapshot and
///   with compaction's catch-up and swap, so every append is indexed against
///   the generation it was written to.
/// - `maintenance`: serializes flush, rotation and compaction.
///
/// Lock order: `maintenance` → `write_lock` → `state`.
pub struct Store {
    config: Config,
    state: Mutex<State>,
    write_lock: Mutex<()>,
    maintenance: Mutex<()>,
    buffers: ArrayQueue<BytesMut>,
    compaction_state: Mutex<CompactionState>,
    recovery_source: RecoverySource,
    cancel: AtomicBool,
    shut_down: AtomicBool,
}

impl Store {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Prepare the data root (pointer file, leftover cleanup)
    /// 2. Recover datafiles and the key directory
    /// 3. Open a fresh active datafile with id `max + 1`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let generation = layout::prepare_root(&config.data_dir)?;
        let recovered = recovery::recover(&generation.path, &config)?;

        let active_id = recovered.max_file_id.checked_add(1).ok_or_else(|| {
            BytecaskError::Recovery("datafile id space exhausted".to_string())
        })?;
        let active = Arc::new(Datafile::create(
            &datafile_path(&generation.path, active_id),
            active_id,
            full_at(&config),
        )?);

        let mut filedir = recovered.filedir;
        filedir.insert(Arc::clone(&active));

        tracing::info!(
            "Store opened at {:?} ({} keys, active datafile {})",
            generation.path,
            recovered.keydir.len(),
            active_id
        );

        Ok(Self {
            config,
            state: Mutex::new(State {
                keydir: recovered.keydir,
                filedir,
                active,
                active_id,
                generation,
            }),
            write_lock: Mutex::new(()),
            maintenance: Mutex::new(()),
            buffers: ArrayQueue::new(BUFFER_POOL_SIZE),
            compaction_state: Mutex::new(CompactionState::Idle),
            recovery_source: recovered.source,
            cancel: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Option<Vec<u8>>> {
        match command {
            Command::Get { key } => self.get(&key).map(Some),
            Command::Set { key, value } => {
                self.set(&key, &value)?;
                Ok(None)
            }
            Command::Delete { key } => {
                self.delete(&key)?;
                Ok(None)
            }
            Command::Ping { message } => {
                Ok(Some(message.unwrap_or_else(|| "PONG".to_string()).into_bytes()))
            }
        }
    }

    /// Get the latest value for `key`
    ///
    /// Resolves the key's location under the lock, then reads outside it. A
    /// read that lands on a datafile retired by compaction re-resolves.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.ensure_running()?;
        read_with_retries(key, |key| self.resolve(key))
    }

    /// Set `key` to `value`
    ///
    /// Appends the record to the active datafile and, only once the append
    /// succeeded, installs the new location in the key directory.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_running()?;
        validate_key(key)?;
        if value.is_empty() {
            return Err(BytecaskError::InvalidArgument(
                "value must not be empty".to_string(),
            ));
        }
        if value.len() > u32::MAX as usize {
            return Err(BytecaskError::InvalidArgument(format!(
                "value of {} bytes exceeds the record limit",
                value.len()
            )));
        }

        self.write_record(key, value)
    }

    /// Delete `key` by appending a tombstone record
    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_running()?;
        validate_key(key)?;

        self.write_record(key, &[])
    }

    /// Persist the key directory and sync the active datafile
    pub fn flush(&self) -> Result<()> {
        let _maintenance = self.maintenance.lock();
        self.ensure_running()?;
        self.flush_locked()
    }

    /// Rotate to a new active datafile if the current one is full
    pub fn rotate_if_full(&self) -> Result<bool> {
        let _maintenance = self.maintenance.lock();
        self.ensure_running()?;

        if !self.state.lock().active.is_full() {
            return Ok(false);
        }
        self.rotate_locked().map(|_| true)
    }

    /// Rotate to a new active datafile unconditionally, returning its id
    pub fn rotate(&self) -> Result<u32> {
        let _maintenance = self.maintenance.lock();
        self.ensure_running()?;
        self.rotate_locked()
    }

    /// Flush the index and active datafile, then retire every handle
    ///
    /// Idempotent. Waits for in-flight maintenance (an in-flight compaction is
    /// asked to abort). Later operations fail.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel.store(true, Ordering::Release);

        let _maintenance = self.maintenance.lock();
        let result = self.flush_locked();
        if let Err(e) = &result {
            tracing::error!("Failed to flush while shutting down: {}", e);
        }

        self.state.lock().filedir.close_all();
        tracing::info!("Store shut down");
        result
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.state.lock().keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().keydir.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn active_file_id(&self) -> u32 {
        self.state.lock().active_id
    }

    /// Number of datafiles in the file directory (including the active one)
    pub fn file_count(&self) -> usize {
        self.state.lock().filedir.len()
    }

    /// Total bytes held by the live generation's datafiles
    pub fn disk_usage(&self) -> u64 {
        self.state.lock().filedir.total_size()
    }

    /// Directory holding the live generation's files
    pub fn generation_dir(&self) -> PathBuf {
        self.state.lock().generation.path.clone()
    }

    /// Root data directory
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// How the key directory was rebuilt when the store opened
    pub fn recovery_source(&self) -> RecoverySource {
        self.recovery_source
    }

    pub fn compaction_state(&self) -> CompactionState {
        *self.compaction_state.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Location of `key` and the handle of the datafile holding it
    fn resolve(&self, key: &str) -> Result<(Meta, Arc<Datafile>)> {
        let state = self.state.lock();
        let meta = *state.keydir.get(key).ok_or(BytecaskError::KeyNotFound)?;
        let datafile = state
            .filedir
            .get(meta.file_id)
            .cloned()
            .ok_or(BytecaskError::StaleHandle { file_id: meta.file_id })?;
        Ok((meta, datafile))
    }

    /// Append a record for `key` and index it; an empty value is a tombstone
    fn write_record(&self, key: &str, value: &[u8]) -> Result<()> {
        let tombstone = value.is_empty();
        let header = Header::new(key.as_bytes(), value, now_secs());

        let mut buf = self.take_buffer();
        encode_record(&mut buf, &header, key.as_bytes(), value);
        let result = self.append_and_index(key, &buf, &header, tombstone);
        self.return_buffer(buf);
        result
    }

    fn append_and_index(&self, key: &str, record: &[u8], header: &Header, tombstone: bool) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        let (active_id, active) = {
            let mut state = self.state.lock();
            if tombstone && !state.keydir.contains(key) {
                return Err(BytecaskError::KeyNotFound);
            }

            let active = Arc::clone(&state.active);
            let registered = state
                .filedir
                .get(state.active_id)
                .map_or(false, |df| Arc::ptr_eq(df, &active));
            if !registered {
                state.filedir.insert(Arc::clone(&active));
            }
            (state.active_id, active)
        };

        // Offsets are u32: a record that would end past that starts a new file
        let (active_id, active) = if !fits_u32(active.size(), record.len()) && active.size() > 0 {
            self.rotate_active()?;
            let state = self.state.lock();
            (state.active_id, Arc::clone(&state.active))
        } else {
            (active_id, active)
        };
        if !fits_u32(active.size(), record.len()) {
            return Err(BytecaskError::InvalidArgument(format!(
                "record of {} bytes does not fit in datafile {}",
                record.len(),
                active_id
            )));
        }

        let offset = active.append(record)?;
        if self.config.fsync_on_write {
            if let Err(e) = active.flush() {
                if let Err(trim) = active.truncate_to(offset) {
                    tracing::error!(
                        "Failed to roll back unsynced record in datafile {}: {}",
                        active_id,
                        trim
                    );
                }
                return Err(e);
            }
        }

        let mut state = self.state.lock();
        if tombstone {
            state.keydir.remove(key);
            tracing::debug!("Deleted {:?} (tombstone at {}@{})", key, active_id, offset);
        } else {
            state.keydir.insert(
                key.to_string(),
                Meta {
                    timestamp: header.timestamp,
                    offset: offset as u32,
                    record_size: record.len() as u32,
                    file_id: active_id,
                },
            );
        }
        Ok(())
    }

    /// Snapshot the index under the write lock, sync, then write the hint
    ///
    /// The snapshot's high-water mark is exact because no append can be in
    /// flight while the write lock is held.
    fn flush_locked(&self) -> Result<()> {
        let (snapshot, dir, active) = {
            let _write_guard = self.write_lock.lock();
            let state = self.state.lock();
            (
                HintSnapshot::new(&state.keydir, state.active_id, state.active.size()),
                state.generation.path.clone(),
                Arc::clone(&state.active),
            )
        };

        active.flush()?;
        write_hint(&dir, &snapshot)?;
        Ok(())
    }

    fn rotate_locked(&self) -> Result<u32> {
        let _write_guard = self.write_lock.lock();
        self.rotate_active()
    }

    /// Switch to a fresh active datafile; the caller holds the write lock
    fn rotate_active(&self) -> Result<u32> {
        let (dir, previous, next_id) = {
            let state = self.state.lock();
            let next_id = state.active_id.checked_add(1).ok_or_else(|| {
                BytecaskError::InvalidArgument("datafile id space exhausted".to_string())
            })?;
            (state.generation.path.clone(), Arc::clone(&state.active), next_id)
        };

        let next = Arc::new(Datafile::create(
            &datafile_path(&dir, next_id),
            next_id,
            full_at(&self.config),
        )?);

        {
            let mut state = self.state.lock();
            state.filedir.insert(Arc::clone(&next));
            state.active = next;
            state.active_id = next_id;
        }

        if let Err(e) = previous.flush() {
            tracing::warn!("Failed to sync rotated datafile {}: {}", previous.id(), e);
        }
        tracing::info!(
            "Rotated active datafile {} ({} bytes) -> {}",
            previous.id(),
            previous.size(),
            next_id
        );
        Ok(next_id)
    }

    pub(crate) fn set_cancel(&self, cancel: bool) {
        self.cancel.store(cancel || self.is_shut_down(), Ordering::Release);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(BytecaskError::InvalidArgument("store is shut down".to_string()));
        }
        Ok(())
    }

    fn take_buffer(&self) -> BytesMut {
        self.buffers.pop().unwrap_or_else(|| BytesMut::with_capacity(4096))
    }

    fn return_buffer(&self, mut buf: BytesMut) {
        if buf.capacity() <= MAX_POOLED_BUFFER {
            buf.clear();
            let _ = self.buffers.push(buf);
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.config.data_dir)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Resolve and read `key`, re-resolving when the read lands on a retired file
fn read_with_retries<F>(key: &str, mut resolve: F) -> Result<Vec<u8>>
where
    F: FnMut(&str) -> Result<(Meta, Arc<Datafile>)>,
{
    let mut last_err = BytecaskError::KeyNotFound;
    for attempt in 0..=STALE_READ_RETRIES {
        let (meta, datafile) = resolve(key)?;
        match read_value(&datafile, &meta, key) {
            Err(e) if e.is_retryable() => {
                tracing::debug!("Stale read of {:?} (attempt {}): {}", key, attempt + 1, e);
                last_err = e;
            }
            result => return result,
        }
    }
    Err(last_err)
}

/// Read and verify the record `meta` points at, returning its value
fn read_value(datafile: &Datafile, meta: &Meta, key: &str) -> Result<Vec<u8>> {
    let bytes = datafile.read(meta.offset as u64, meta.record_size as u64)?;
    let record = Record::decode(&bytes)?;

    if record.key != key {
        return Err(BytecaskError::CorruptKey(format!(
            "expected {:?} at {}@{}, found {:?}",
            key, meta.file_id, meta.offset, record.key
        )));
    }
    if record.is_tombstone() {
        return Err(BytecaskError::KeyNotFound);
    }
    Ok(record.value)
}

/// True if a record of `len` bytes appended at `offset` stays addressable
fn fits_u32(offset: u64, len: usize) -> bool {
    offset + len as u64 <= u32::MAX as u64
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(BytecaskError::InvalidArgument("key must not be empty".to_string()));
    }
    if key.len() > u32::MAX as usize {
        return Err(BytecaskError::InvalidArgument("key exceeds the record limit".to_string()));
    }
    Ok(())
}

/// Offset at which a datafile reports full
pub(crate) fn full_at(config: &Config) -> u64 {
    (config.max_datafile_size as f64 * config.rotation_threshold) as u64
}
