//! Datafile
//!
//! A single append-only file with an independent write cursor and positional
//! reads.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{BytecaskError, Result};

/// An append-only datafile identified by an integer id
///
/// ## Concurrency:
/// - `writer`: Mutex-guarded append handle (one appender at a time)
/// - `reader`: separate handle used only for positional reads, so readers never
///   contend with or observe the writer's cursor
/// - `offset`: mirrors the file length; advanced only after a successful write
/// - `closed`: set when a compaction swap retires the file
#[derive(Debug)]
pub struct Datafile {
    id: u32,
    writer: Option<Mutex<File>>,
    reader: File,
    offset: AtomicU64,
    full_at: u64,
    closed: AtomicBool,
}

impl Datafile {
    /// Create a new, empty, writable datafile
    ///
    /// Fails if the file already exists: an active file never reuses an old one.
    pub fn create(path: &Path, id: u32, full_at: u64) -> Result<Self> {
        let writer = OpenOptions::new().append(true).create_new(true).open(path)?;
        let reader = File::open(path)?;

        tracing::debug!("Created datafile {} at {:?}", id, path);

        Ok(Self {
            id,
            writer: Some(Mutex::new(writer)),
            reader,
            offset: AtomicU64::new(0),
            full_at,
            closed: AtomicBool::new(false),
        })
    }

    /// Open an existing datafile for reading only
    pub fn open_read_only(path: &Path, id: u32) -> Result<Self> {
        let reader = File::open(path)?;
        let len = reader.metadata()?.len();

        Ok(Self {
            id,
            writer: None,
            reader,
            offset: AtomicU64::new(len),
            full_at: u64::MAX,
            closed: AtomicBool::new(false),
        })
    }

    /// Append `data` to the end of the file and return its starting offset
    ///
    /// A failed write leaves the offset untouched and trims any partially
    /// written bytes so the file length keeps matching the offset.
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Err(BytecaskError::EmptyWrite);
        }
        self.ensure_open()?;

        let writer = self.writer.as_ref().ok_or_else(|| {
            BytecaskError::InvalidArgument(format!("datafile {} is read-only", self.id))
        })?;
        let mut file = writer.lock();

        let offset = self.offset.load(Ordering::Acquire);
        if let Err(e) = file.write_all(data) {
            if let Err(trim) = file.set_len(offset) {
                tracing::error!(
                    "Failed to trim datafile {} back to {} after a failed append: {}",
                    self.id,
                    offset,
                    trim
                );
            }
            return Err(e.into());
        }
        self.offset.store(offset + data.len() as u64, Ordering::Release);

        Ok(offset)
    }

    /// Discard everything past `len`, rolling back records appended after it
    ///
    /// Used when an appended record could not be made durable. Only shrinks.
    pub fn truncate_to(&self, len: u64) -> Result<()> {
        let writer = self.writer.as_ref().ok_or_else(|| {
            BytecaskError::InvalidArgument(format!("datafile {} is read-only", self.id))
        })?;
        let file = writer.lock();

        let offset = self.offset.load(Ordering::Acquire);
        if len > offset {
            return Err(BytecaskError::InvalidArgument(format!(
                "cannot truncate datafile {} of {} bytes to {}",
                self.id, offset, len
            )));
        }
        file.set_len(len)?;
        self.offset.store(len, Ordering::Release);
        Ok(())
    }

    /// Read exactly `size` bytes starting at `offset`
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.ensure_open()?;

        let mut buf = vec![0u8; size as usize];
        read_exact_at(&self.reader, &mut buf, offset)?;
        Ok(buf)
    }

    /// Force appended bytes to stable storage
    pub fn flush(&self) -> Result<()> {
        if let Some(writer) = &self.writer {
            writer.lock().sync_data()?;
        }
        Ok(())
    }

    /// True once the write offset reaches the rotation high-water mark
    pub fn is_full(&self) -> bool {
        self.size() >= self.full_at
    }

    /// Current write offset (equals the file length)
    pub fn size(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    /// Retire the handle; later reads and appends fail with `StaleHandle`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BytecaskError::StaleHandle { file_id: self.id });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
