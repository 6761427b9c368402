//! Key exclusion filtering.
//!
//! An exclusion list drops records before they ever reach the stage 1 index,
//! so excluded keys never occupy sort or temp space. The set is built once
//! and shared read-only across workers; the empty set is the no-op filter.

use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashSet;

/// Set of keys to drop unconditionally, with O(1) lookup.
#[derive(Debug, Default)]
pub struct ExcludeSet {
    set: FxHashSet<String>,
}

impl ExcludeSet {
    /// Build from a key list; blank entries are ignored.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        let set = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { set }
    }

    /// Load from a newline-delimited key file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut keys = Vec::new();
        for line in reader.lines() {
            keys.push(line?);
        }
        log::debug!("loaded {} exclude keys from {}", keys.len(), path.display());
        Ok(Self::new(keys))
    }

    /// True for keys NOT in the set; the empty set allows everything.
    pub fn allows(&self, key: &str) -> bool {
        !self.set.contains(key)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
