//! KeyDir implementation
//!
//! HashMap-based index; callers hold the store's state lock around every access.

use std::collections::HashMap;

use super::Meta;

/// Mapping from key to its latest live record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDir {
    entries: HashMap<String, Meta>,
}

impl KeyDir {
    /// Create a new empty KeyDir
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry
    pub fn get(&self, key: &str) -> Option<&Meta> {
        self.entries.get(key).filter(|meta| meta.is_live())
    }

    /// Install the latest location for `key`, returning the entry it replaced
    pub fn insert(&mut self, key: String, meta: Meta) -> Option<Meta> {
        self.entries.insert(key, meta)
    }

    pub fn remove(&mut self, key: &str) -> Option<Meta> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Meta)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

impl FromIterator<(String, Meta)> for KeyDir {
    fn from_iter<I: IntoIterator<Item = (String, Meta)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
