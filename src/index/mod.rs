//! Index Module
//!
//! Collection-parent index: for each collection id, the parent paths under
//! which a collection with that id holds cached documents. The cache only
//! notifies it; planners use it to fan out collection-group queries.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

use crate::error::Result;
use crate::model::ResourcePath;
use crate::store::StoreTransaction;

/// Receives the collection path of every document the cache writes
pub trait IndexManager: Send + Sync {
    /// Record that `collection_path` holds at least one cached document
    fn add_to_collection_parent_index(
        &self,
        txn: &mut dyn StoreTransaction,
        collection_path: &ResourcePath,
    ) -> Result<()>;

    /// Parent paths of every known collection called `collection_id`
    fn get_collection_parents(
        &self,
        txn: &dyn StoreTransaction,
        collection_id: &str,
    ) -> Result<Vec<ResourcePath>>;
}

/// In-memory collection-parent index
///
/// Entries are only ever added, so an entry left behind by a rolled-back
/// transaction costs a wasted lookup and never a wrong answer.
#[derive(Debug, Default)]
pub struct MemoryIndexManager {
    /// collection id → parent paths
    collection_parents: Mutex<HashMap<String, BTreeSet<ResourcePath>>>,
}

impl MemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the entry was new
    pub fn add_collection_parent(&self, collection_path: &ResourcePath) -> bool {
        let Some(collection_id) = collection_path.last_segment() else {
            return false;
        };
        let parent = collection_path.pop_last();
        self.collection_parents
            .lock()
            .entry(collection_id.to_string())
            .or_default()
            .insert(parent)
    }
}

impl IndexManager for MemoryIndexManager {
    fn add_to_collection_parent_index(
        &self,
        _txn: &mut dyn StoreTransaction,
        collection_path: &ResourcePath,
    ) -> Result<()> {
        if self.add_collection_parent(collection_path) {
            tracing::trace!("New collection parent for {}", collection_path);
        }
        Ok(())
    }

    fn get_collection_parents(
        &self,
        _txn: &dyn StoreTransaction,
        collection_id: &str,
    ) -> Result<Vec<ResourcePath>> {
        Ok(self
            .collection_parents
            .lock()
            .get(collection_id)
            .map(|parents| parents.iter().cloned().collect())
            .unwrap_or_default())
    }
}
