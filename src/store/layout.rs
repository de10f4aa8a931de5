//! Directory layout
//!
//! The data root holds one or more generation directories and a `CURRENT`
//! pointer naming the live one. Compaction stages a new generation under
//! `.compaction/`, renames it to an unused generation name, and then replaces
//! `CURRENT` atomically; a crash at any point leaves the pointer naming a
//! complete generation.
//!
//! ```text
//! {data_dir}/
//!   ├── CURRENT                  "generation_000002\n"
//!   ├── generation_000002/
//!   │     ├── data_1.db
//!   │     ├── data_2.db
//!   │     └── key_hint.db
//!   └── .compaction/             (staging, removed on startup)
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{BytecaskError, Result};

pub(crate) const CURRENT_FILENAME: &str = "CURRENT";
pub(crate) const STAGING_DIRNAME: &str = ".compaction";

/// One generation directory of datafiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub number: u64,
    pub path: PathBuf,
}

impl Generation {
    pub fn new(root: &Path, number: u64) -> Self {
        Self {
            number,
            path: root.join(generation_name(number)),
        }
    }

    /// The generation a compaction of this one produces
    pub fn successor(&self, root: &Path) -> Self {
        Self::new(root, self.number + 1)
    }

    pub fn name(&self) -> String {
        generation_name(self.number)
    }
}

/// 2 → "generation_000002"
pub(crate) fn generation_name(number: u64) -> String {
    format!("generation_{:06}", number)
}

/// "generation_000002" → Some(2)
pub(crate) fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix("generation_")?.parse().ok()
}

pub(crate) fn staging_dir(root: &Path) -> PathBuf {
    root.join(STAGING_DIRNAME)
}

/// Prepare the data root and return the live generation
///
/// 1. Create the root if missing
/// 2. Remove staging leftovers from an interrupted compaction
/// 3. Read `CURRENT`, or initialize generation 1 for a fresh root
/// 4. Remove generation directories `CURRENT` does not name
pub(crate) fn prepare_root(root: &Path) -> Result<Generation> {
    fs::create_dir_all(root)?;

    remove_dir_if_exists(&staging_dir(root))?;
    remove_file_if_exists(&current_tmp_path(root))?;

    let generation = match read_current(root)? {
        Some(generation) => {
            if !generation.path.is_dir() {
                return Err(BytecaskError::Recovery(format!(
                    "CURRENT names {:?} but the directory is missing",
                    generation.path
                )));
            }
            generation
        }
        None => {
            let generation = Generation::new(root, 1);
            fs::create_dir_all(&generation.path)?;
            write_current(root, &generation)?;
            sync_dir(root)?;
            tracing::info!("Initialized new data directory at {:?}", root);
            generation
        }
    };

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match parse_generation(&name) {
            Some(number) if number != generation.number && entry.path().is_dir() => {
                tracing::warn!("Removing orphaned generation directory {:?}", entry.path());
                remove_dir_if_exists(&entry.path())?;
            }
            _ => {}
        }
    }

    Ok(generation)
}

/// Read the generation named by `CURRENT`, if the pointer exists
pub(crate) fn read_current(root: &Path) -> Result<Option<Generation>> {
    let contents = match fs::read_to_string(root.join(CURRENT_FILENAME)) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let name = contents.trim();
    let number = parse_generation(name).ok_or_else(|| {
        BytecaskError::Recovery(format!("CURRENT holds an invalid generation name {:?}", name))
    })?;
    Ok(Some(Generation::new(root, number)))
}

/// Atomically point `CURRENT` at `generation`
///
/// The rename is the commit point. Callers follow up with `sync_dir(root)` to
/// make the new pointer durable.
pub(crate) fn write_current(root: &Path, generation: &Generation) -> Result<()> {
    let tmp_path = current_tmp_path(root);
    let mut file = File::create(&tmp_path)?;
    writeln!(file, "{}", generation.name())?;
    file.sync_all()?;
    fs::rename(&tmp_path, root.join(CURRENT_FILENAME))?;
    Ok(())
}

/// Make directory entry changes (renames, creations) durable
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn current_tmp_path(root: &Path) -> PathBuf {
    root.join("CURRENT.tmp")
}
