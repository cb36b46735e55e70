use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::warn;

use crate::types::ManifestRecord;

/// In-memory view of the manifest used for duplicate and resume decisions.
///
/// Derived state only: it is rebuilt from the manifest at start-up and then
/// kept in step with every appended record.
#[derive(Debug, Default, Clone)]
pub struct HashIndex {
    /// hash -> first original path seen with that hash
    by_hash: HashMap<String, String>,

    /// original path -> hash, for every recorded path
    by_path: HashMap<String, String>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from replayed manifest records
    pub fn from_records(records: &[ManifestRecord]) -> Self {
        let mut index = Self::new();

        // First row per hash owns the content, whatever its duplicate-of says
        for record in records {
            index.insert_canonical(&record.content_hash, &record.original_path);
        }

        for record in records {
            if let Some(previous) = index.insert_path(&record.original_path, &record.content_hash) {
                if previous != record.content_hash {
                    warn!(
                        "Manifest lists {} twice with different hashes ({} and {})",
                        record.original_path, previous, record.content_hash
                    );
                }
            }
        }

        index
    }

    /// Original path owning `hash`, if the content has been seen
    pub fn owner_of(&self, hash: &str) -> Option<&str> {
        self.by_hash.get(hash).map(String::as_str)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// Register `path` as owner of `hash` unless the hash already has one.
    ///
    /// Returns whether `path` became the owner.
    pub fn insert_canonical(&mut self, hash: &str, path: &str) -> bool {
        match self.by_hash.entry(hash.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(path.to_string());
                true
            }
        }
    }

    /// Record that `path` has been processed with `hash`, returning any previous hash
    pub fn insert_path(&mut self, path: &str, hash: &str) -> Option<String> {
        self.by_path.insert(path.to_string(), hash.to_string())
    }

    /// Apply a freshly appended record to both views
    pub fn commit(&mut self, record: &ManifestRecord) {
        if record.is_canonical() {
            self.insert_canonical(&record.content_hash, &record.original_path);
        }
        self.insert_path(&record.original_path, &record.content_hash);
    }

    /// Number of distinct contents known
    pub fn distinct_hashes(&self) -> usize {
        self.by_hash.len()
    }

    /// Number of processed paths known
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
