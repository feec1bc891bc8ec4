//! Reverse index from column hash to owning mapping id

use parking_lot::RwLock;
use ahash::AHashMap;
use tracing::debug;

/// `layer#column` to mapping id
///
/// A column belongs to at most one mapping. Inserting a hash that is already
/// owned repoints it at the newer mapping.
pub struct ColumnIndex {
    owners: RwLock<AHashMap<String, String>>,
}

impl ColumnIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            owners: RwLock::new(AHashMap::new()),
        }
    }

    /// Point `hash` at `mapping_id`, returning the previous owner
    pub fn insert(&self, hash: String, mapping_id: &str) -> Option<String> {
        let previous = self.owners.write().insert(hash.clone(), mapping_id.to_string());
        if let Some(prev) = previous.as_deref().filter(|prev| *prev != mapping_id) {
            debug!("Column {} moved from mapping {} to {}", hash, prev, mapping_id);
        }
        previous
    }

    /// Drop `hash` only while it still points at `mapping_id`
    pub fn remove_if_owner(&self, hash: &str, mapping_id: &str) -> bool {
        let mut owners = self.owners.write();
        if owners.get(hash).map(String::as_str) == Some(mapping_id) {
            owners.remove(hash);
            true
        } else {
            false
        }
    }

    /// Id of the mapping owning `hash`
    pub fn owner(&self, hash: &str) -> Option<String> {
        self.owners.read().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }

    /// Clear the index
    pub fn clear(&self) {
        self.owners.write().clear();
    }
}

impl Default for ColumnIndex {
    fn default() -> Self {
        Self::new()
    }
}
