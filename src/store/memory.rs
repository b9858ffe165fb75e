//! In-memory store
//!
//! BTreeMap tables behind a single RwLock. Read-write transactions hold the
//! write lock for their whole lifetime and keep an undo log, so a failed or
//! dropped transaction leaves no trace. Read-only transactions share the
//! read lock.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::codec::{DbRemoteDocument, DbRemoteDocumentGlobal};
use crate::error::{CacheError, Result};
use crate::model::ResourcePath;

use super::snapshot::{self, SnapshotData, SnapshotRef};
use super::{
    IndexKey, IterateCallback, IterateOptions, IterationAction, IterationController,
    RemoteDocumentIndex, StoreTransaction,
};

// =============================================================================
// Tables
// =============================================================================

/// Second half of an index entry. Stored entries always hold `Row`; `Min`
/// and `Max` only appear in bounds so a bound on the index key alone can be
/// expressed as a bound on the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowSlot {
    Min,
    Row(ResourcePath),
    Max,
}

type IndexEntry = (IndexKey, RowSlot);

#[derive(Debug, Default)]
struct Tables {
    remote_documents: BTreeMap<ResourcePath, DbRemoteDocument>,
    primary_index: BTreeSet<IndexEntry>,
    read_time_index: BTreeSet<IndexEntry>,
    collection_read_time_index: BTreeSet<IndexEntry>,
    metadata: Option<DbRemoteDocumentGlobal>,
}

impl Tables {
    fn index(&self, index: RemoteDocumentIndex) -> &BTreeSet<IndexEntry> {
        match index {
            RemoteDocumentIndex::Primary => &self.primary_index,
            RemoteDocumentIndex::ReadTime => &self.read_time_index,
            RemoteDocumentIndex::CollectionReadTime => &self.collection_read_time_index,
        }
    }

    fn index_mut(&mut self, index: RemoteDocumentIndex) -> &mut BTreeSet<IndexEntry> {
        match index {
            RemoteDocumentIndex::Primary => &mut self.primary_index,
            RemoteDocumentIndex::ReadTime => &mut self.read_time_index,
            RemoteDocumentIndex::CollectionReadTime => &mut self.collection_read_time_index,
        }
    }

    /// Index entries a row contributes
    fn index_entries(
        key: &ResourcePath,
        record: &DbRemoteDocument,
    ) -> Vec<(RemoteDocumentIndex, IndexEntry)> {
        let slot = RowSlot::Row(key.clone());
        let mut entries = vec![(
            RemoteDocumentIndex::Primary,
            (IndexKey::Path(key.clone()), slot.clone()),
        )];
        if let Some(read_time) = record.read_time {
            entries.push((
                RemoteDocumentIndex::ReadTime,
                (IndexKey::ReadTime(read_time), slot.clone()),
            ));
            entries.push((
                RemoteDocumentIndex::CollectionReadTime,
                (
                    IndexKey::CollectionReadTime(record.parent_path.clone(), read_time),
                    slot,
                ),
            ));
        }
        entries
    }

    fn insert_row(
        &mut self,
        key: ResourcePath,
        record: DbRemoteDocument,
    ) -> Option<DbRemoteDocument> {
        let previous = self.remove_row(&key);
        for (index, entry) in Self::index_entries(&key, &record) {
            self.index_mut(index).insert(entry);
        }
        self.remote_documents.insert(key, record);
        previous
    }

    fn remove_row(&mut self, key: &ResourcePath) -> Option<DbRemoteDocument> {
        let previous = self.remote_documents.remove(key)?;
        for (index, entry) in Self::index_entries(key, &previous) {
            self.index_mut(index).remove(&entry);
        }
        Some(previous)
    }

    fn iterate(&self, options: &IterateOptions, callback: &mut IterateCallback<'_>) -> Result<()> {
        let index = self.index(options.index);
        let mut lower = lower_entry_bound(&options.range.lower);
        let mut upper = upper_entry_bound(&options.range.upper);
        let mut control = IterationController::new();

        loop {
            if range_is_empty(&lower, &upper) {
                return Ok(());
            }

            let mut candidates = index.range((lower.clone(), upper.clone()));
            let next = if options.reverse {
                candidates.next_back()
            } else {
                candidates.next()
            };
            let Some(current) = next.cloned() else {
                return Ok(());
            };

            let RowSlot::Row(primary_key) = &current.1 else {
                return Err(CacheError::Corruption(
                    "index holds a bound marker instead of a row".to_string(),
                ));
            };
            let record = self.remote_documents.get(primary_key).ok_or_else(|| {
                CacheError::Corruption(format!("index entry without a row: {}", primary_key))
            })?;

            callback(primary_key, record, &mut control)?;

            match control.take_action() {
                Some(IterationAction::Done) => return Ok(()),
                Some(IterationAction::Skip(target)) if options.reverse => {
                    let target = (target, RowSlot::Max);
                    upper = if target < current {
                        Bound::Included(target)
                    } else {
                        Bound::Excluded(current)
                    };
                }
                Some(IterationAction::Skip(target)) => {
                    let target = (target, RowSlot::Min);
                    lower = if target > current {
                        Bound::Included(target)
                    } else {
                        Bound::Excluded(current)
                    };
                }
                None if options.reverse => upper = Bound::Excluded(current),
                None => lower = Bound::Excluded(current),
            }
        }
    }
}

fn lower_entry_bound(bound: &Bound<IndexKey>) -> Bound<IndexEntry> {
    match bound {
        Bound::Included(key) => Bound::Included((key.clone(), RowSlot::Min)),
        Bound::Excluded(key) => Bound::Excluded((key.clone(), RowSlot::Max)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn upper_entry_bound(bound: &Bound<IndexKey>) -> Bound<IndexEntry> {
    match bound {
        Bound::Included(key) => Bound::Included((key.clone(), RowSlot::Max)),
        Bound::Excluded(key) => Bound::Excluded((key.clone(), RowSlot::Min)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// `BTreeSet::range` panics on inverted ranges; check first
fn range_is_empty(lower: &Bound<IndexEntry>, upper: &Bound<IndexEntry>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

// =============================================================================
// Transactions
// =============================================================================

enum UndoEntry {
    Row {
        key: ResourcePath,
        previous: Option<DbRemoteDocument>,
    },
    Metadata(Option<DbRemoteDocumentGlobal>),
}

/// Read-write transaction; rolls back on drop unless committed
struct MemoryTransaction<'a> {
    tables: &'a mut Tables,
    undo_log: Vec<UndoEntry>,
    committed: bool,
}

impl<'a> MemoryTransaction<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            undo_log: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
        self.undo_log.clear();
    }

    fn rollback(&mut self) {
        while let Some(entry) = self.undo_log.pop() {
            match entry {
                UndoEntry::Row {
                    key,
                    previous: Some(record),
                } => {
                    self.tables.insert_row(key, record);
                }
                UndoEntry::Row {
                    key,
                    previous: None,
                } => {
                    self.tables.remove_row(&key);
                }
                UndoEntry::Metadata(previous) => self.tables.metadata = previous,
            }
        }
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get(&self, key: &ResourcePath) -> Result<Option<DbRemoteDocument>> {
        Ok(self.tables.remote_documents.get(key).cloned())
    }

    fn put(&mut self, key: &ResourcePath, record: DbRemoteDocument) -> Result<()> {
        let previous = self.tables.insert_row(key.clone(), record);
        self.undo_log.push(UndoEntry::Row {
            key: key.clone(),
            previous,
        });
        Ok(())
    }

    fn delete(&mut self, key: &ResourcePath) -> Result<()> {
        if let Some(previous) = self.tables.remove_row(key) {
            self.undo_log.push(UndoEntry::Row {
                key: key.clone(),
                previous: Some(previous),
            });
        }
        Ok(())
    }

    fn iterate(&self, options: &IterateOptions, callback: &mut IterateCallback<'_>) -> Result<()> {
        self.tables.iterate(options, callback)
    }

    fn get_metadata(&self) -> Result<Option<DbRemoteDocumentGlobal>> {
        Ok(self.tables.metadata)
    }

    fn put_metadata(&mut self, metadata: DbRemoteDocumentGlobal) -> Result<()> {
        let previous = self.tables.metadata.replace(metadata);
        self.undo_log.push(UndoEntry::Metadata(previous));
        Ok(())
    }
}

/// Read-only transaction under the shared lock
struct ReadOnlyTransaction<'a> {
    tables: &'a Tables,
}

impl ReadOnlyTransaction<'_> {
    fn read_only_error() -> CacheError {
        CacheError::Transaction("cannot write in a read-only transaction".to_string())
    }
}

impl StoreTransaction for ReadOnlyTransaction<'_> {
    fn get(&self, key: &ResourcePath) -> Result<Option<DbRemoteDocument>> {
        Ok(self.tables.remote_documents.get(key).cloned())
    }

    fn put(&mut self, _key: &ResourcePath, _record: DbRemoteDocument) -> Result<()> {
        Err(Self::read_only_error())
    }

    fn delete(&mut self, _key: &ResourcePath) -> Result<()> {
        Err(Self::read_only_error())
    }

    fn iterate(&self, options: &IterateOptions, callback: &mut IterateCallback<'_>) -> Result<()> {
        self.tables.iterate(options, callback)
    }

    fn get_metadata(&self) -> Result<Option<DbRemoteDocumentGlobal>> {
        Ok(self.tables.metadata)
    }

    fn put_metadata(&mut self, _metadata: DbRemoteDocumentGlobal) -> Result<()> {
        Err(Self::read_only_error())
    }
}

// =============================================================================
// Store
// =============================================================================

/// Result of writing a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Rows written
    pub documents: usize,
    /// File size in bytes
    pub bytes: u64,
}

/// In-memory ordered transactional store
///
/// ## Concurrency
/// - Read-write transactions: exclusive (write lock held until commit/rollback)
/// - Read-only transactions: shared (read lock)
pub struct MemoryStore {
    tables: RwLock<Tables>,

    /// Committed read-write transactions since open
    commits: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store with a zeroed metadata row
    pub fn new() -> Self {
        let tables = Tables {
            metadata: Some(DbRemoteDocumentGlobal::default()),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
            commits: AtomicU64::new(0),
        }
    }

    /// Run `action` in a read-write transaction
    ///
    /// Commits when `action` returns `Ok`; every write is undone when it
    /// returns `Err` (or panics).
    pub fn run_transaction<R>(
        &self,
        name: &str,
        action: impl FnOnce(&mut dyn StoreTransaction) -> Result<R>,
    ) -> Result<R> {
        let mut tables = self.tables.write();
        let mut txn = MemoryTransaction::new(&mut tables);

        match action(&mut txn) {
            Ok(value) => {
                txn.commit();
                self.commits.fetch_add(1, Ordering::SeqCst);
                tracing::trace!("Transaction '{}' committed", name);
                Ok(value)
            }
            Err(e) => {
                drop(txn);
                tracing::debug!("Transaction '{}' rolled back: {}", name, e);
                Err(e)
            }
        }
    }

    /// Run `action` in a read-only transaction
    pub fn run_read_transaction<R>(
        &self,
        name: &str,
        action: impl FnOnce(&dyn StoreTransaction) -> Result<R>,
    ) -> Result<R> {
        let tables = self.tables.read();
        let txn = ReadOnlyTransaction { tables: &tables };
        let result = action(&txn);
        if let Err(e) = &result {
            tracing::debug!("Read transaction '{}' failed: {}", name, e);
        }
        result
    }

    /// Number of rows (sentinel deletes included)
    pub fn document_count(&self) -> usize {
        self.tables.read().remote_documents.len()
    }

    /// Committed read-write transactions since the store was created
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Write every row and the metadata to `path`
    ///
    /// Takes the read lock, so the snapshot never contains a partial
    /// transaction.
    pub fn save_snapshot(&self, path: &Path) -> Result<SnapshotStats> {
        let tables = self.tables.read();
        let data = SnapshotRef {
            metadata: tables.metadata,
            documents: tables.remote_documents.iter().collect(),
        };
        let bytes = snapshot::write_snapshot(path, &data)?;
        Ok(SnapshotStats {
            documents: tables.remote_documents.len(),
            bytes,
        })
    }

    /// Rebuild a store (indexes included) from a snapshot file
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let SnapshotData {
            metadata,
            documents,
        } = snapshot::read_snapshot(path)?;

        let mut tables = Tables {
            metadata,
            ..Tables::default()
        };
        for (key, record) in documents {
            tables.insert_row(key, record);
        }

        Ok(Self {
            tables: RwLock::new(tables),
            commits: AtomicU64::new(0),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
