//! File directory
//!
//! Maps datafile ids to open handles, plus the on-disk naming scheme.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Datafile;

/// Name of the persisted key directory snapshot inside a generation directory
pub const HINT_FILENAME: &str = "key_hint.db";

/// Every datafile that may still be referenced by a key, plus the active one
///
/// Handles are reference counted so an in-flight read keeps its descriptor
/// alive even after the directory drops the entry.
#[derive(Debug, Clone, Default)]
pub struct FileDir {
    files: BTreeMap<u32, Arc<Datafile>>,
}

impl FileDir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, datafile: Arc<Datafile>) -> Option<Arc<Datafile>> {
        self.files.insert(datafile.id(), datafile)
    }

    pub fn get(&self, id: u32) -> Option<&Arc<Datafile>> {
        self.files.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.files.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.files.keys().copied()
    }

    /// Handles in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Datafile>> {
        self.files.values()
    }

    /// Sum of all datafile lengths
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.size()).sum()
    }

    /// Mark every handle closed so stale readers fail fast
    pub fn close_all(&self) {
        for datafile in self.files.values() {
            datafile.close();
        }
    }
}

/// Path of datafile `id` inside `dir`
/// 7 → "{dir}/data_7.db"
pub fn datafile_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("data_{}.db", id))
}

/// Parse a datafile id from a file name
/// "data_42.db" → Some(42)
///
/// Only the canonical spelling is accepted, so "data_007.db" or "data_+7.db"
/// never alias the file of id 7.
pub fn parse_datafile_id(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("data_")?.strip_suffix(".db")?;
    let id: u32 = digits.parse().ok()?;
    (id.to_string() == digits).then_some(id)
}
