//! Change buffer
//!
//! Stages upserts and removals for one logical write, then commits them
//! together with the exact size delta in [`ChangeBuffer::apply`].
//!
//! ```text
//!   get_entry / get_entries ──► overlay hit? ──yes──► staged value
//!                                    │no
//!                                    ▼
//!                         backend.lookup(_all)  (records prior sizes)
//!
//!   set_entry / remove_entry ──► overlay (last write per key wins)
//!
//!   apply ──► backend.apply_changes(overlay, read_time)   (once)
//! ```
//!
//! Storage specifics live behind [`ChangeBufferBackend`]; the overlay,
//! the buffer-wide read time and the single-use rule live here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{CacheError, Result};
use crate::model::{DocumentKey, MaybeDocument, NoDocument, SnapshotVersion};
use crate::store::StoreTransaction;

use super::remote_document_cache::RemoteDocumentCache;
use super::NullableMaybeDocumentMap;

/// A staged write for one key
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange {
    Upsert(MaybeDocument),
    Removal,
}

/// Staged writes in key order
pub type StagedChanges = BTreeMap<DocumentKey, StagedChange>;

/// Reads and commits on behalf of a [`ChangeBuffer`]
pub trait ChangeBufferBackend {
    /// Read one entry that is not staged
    fn lookup(
        &mut self,
        txn: &dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<Option<MaybeDocument>>;

    /// Read several entries that are not staged; every key is in the result
    fn lookup_all(
        &mut self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
    ) -> Result<NullableMaybeDocumentMap>;

    /// Write every staged change inside `txn`
    fn apply_changes(
        &mut self,
        txn: &mut dyn StoreTransaction,
        changes: &StagedChanges,
        read_time: Option<SnapshotVersion>,
    ) -> Result<()>;
}

/// Single-use staging area for document writes
pub struct ChangeBuffer<B: ChangeBufferBackend> {
    backend: B,
    changes: StagedChanges,
    /// Read time shared by every staged write
    read_time: Option<SnapshotVersion>,
    changes_applied: bool,
}

impl<B: ChangeBufferBackend> ChangeBuffer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            changes: StagedChanges::new(),
            read_time: None,
            changes_applied: false,
        }
    }

    /// Read an entry, staged writes first
    ///
    /// A staged removal reads as `None`.
    pub fn get_entry(
        &mut self,
        txn: &dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<Option<MaybeDocument>> {
        self.assert_not_applied()?;

        if let Some(change) = self.changes.get(key) {
            return Ok(staged_value(change));
        }
        self.backend.lookup(txn, key)
    }

    /// Read several entries, staged writes first; every key is in the result
    pub fn get_entries(
        &mut self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
    ) -> Result<NullableMaybeDocumentMap> {
        self.assert_not_applied()?;

        let mut results = NullableMaybeDocumentMap::new();
        let mut unstaged = BTreeSet::new();
        for key in keys {
            match self.changes.get(key) {
                Some(change) => {
                    results.insert(key.clone(), staged_value(change));
                }
                None => {
                    unstaged.insert(key.clone());
                }
            }
        }

        if !unstaged.is_empty() {
            results.extend(self.backend.lookup_all(txn, &unstaged)?);
        }
        Ok(results)
    }

    /// Stage an upsert of `maybe_document` at `read_time`
    pub fn set_entry(
        &mut self,
        maybe_document: MaybeDocument,
        read_time: SnapshotVersion,
    ) -> Result<()> {
        self.assert_not_applied()?;
        self.set_read_time(read_time)?;
        self.changes.insert(
            maybe_document.key().clone(),
            StagedChange::Upsert(maybe_document),
        );
        Ok(())
    }

    /// Stage a removal of `key`
    ///
    /// A read time is only needed when removals are written as sentinel
    /// deletes.
    pub fn remove_entry(
        &mut self,
        key: &DocumentKey,
        read_time: Option<SnapshotVersion>,
    ) -> Result<()> {
        self.assert_not_applied()?;
        if let Some(read_time) = read_time {
            self.set_read_time(read_time)?;
        }
        self.changes.insert(key.clone(), StagedChange::Removal);
        Ok(())
    }

    /// Commit every staged change inside `txn`
    ///
    /// The buffer is spent afterwards, even if the commit failed.
    pub fn apply(&mut self, txn: &mut dyn StoreTransaction) -> Result<()> {
        self.assert_not_applied()?;
        self.changes_applied = true;
        self.backend
            .apply_changes(txn, &self.changes, self.read_time)
    }

    pub fn read_time(&self) -> Option<SnapshotVersion> {
        self.read_time
    }

    /// Number of staged keys
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn set_read_time(&mut self, read_time: SnapshotVersion) -> Result<()> {
        match self.read_time {
            Some(current) if current != read_time => Err(CacheError::Precondition(format!(
                "change buffer read time {} conflicts with {}",
                current, read_time
            ))),
            _ => {
                self.read_time = Some(read_time);
                Ok(())
            }
        }
    }

    fn assert_not_applied(&self) -> Result<()> {
        if self.changes_applied {
            return Err(CacheError::Precondition(
                "change buffer was already applied".to_string(),
            ));
        }
        Ok(())
    }
}

fn staged_value(change: &StagedChange) -> Option<MaybeDocument> {
    match change {
        StagedChange::Upsert(doc) => Some(doc.clone()),
        StagedChange::Removal => None,
    }
}

// =============================================================================
// Size-tracking backend
// =============================================================================

/// Backend writing to a [`RemoteDocumentCache`] and keeping its byte size
/// exact
///
/// The size of every key is recorded the first time it is read through the
/// buffer; `apply_changes` refuses keys it has no size for.
pub struct SizeTrackingBackend<'a> {
    cache: &'a RemoteDocumentCache,
    track_removals: bool,
    /// Size of each key as first observed (0 when absent)
    document_sizes: HashMap<DocumentKey, usize>,
}

impl<'a> SizeTrackingBackend<'a> {
    pub fn new(cache: &'a RemoteDocumentCache, track_removals: bool) -> Self {
        Self {
            cache,
            track_removals,
            document_sizes: HashMap::new(),
        }
    }

    pub fn track_removals(&self) -> bool {
        self.track_removals
    }

    /// Size recorded for `key` before any staged write
    pub fn prior_size(&self, key: &DocumentKey) -> Option<usize> {
        self.document_sizes.get(key).copied()
    }

    fn record_size(&mut self, key: &DocumentKey, size: usize) {
        self.document_sizes.entry(key.clone()).or_insert(size);
    }
}

impl ChangeBufferBackend for SizeTrackingBackend<'_> {
    fn lookup(
        &mut self,
        txn: &dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<Option<MaybeDocument>> {
        match self.cache.get_sized_entry(txn, key)? {
            Some(entry) => {
                self.record_size(key, entry.size);
                Ok(Some(entry.maybe_document))
            }
            None => {
                self.record_size(key, 0);
                Ok(None)
            }
        }
    }

    fn lookup_all(
        &mut self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
    ) -> Result<NullableMaybeDocumentMap> {
        let entries = self.cache.get_sized_entries(txn, keys)?;
        for (key, size) in &entries.sizes {
            self.record_size(key, *size);
        }
        Ok(entries.maybe_documents)
    }

    fn apply_changes(
        &mut self,
        txn: &mut dyn StoreTransaction,
        changes: &StagedChanges,
        read_time: Option<SnapshotVersion>,
    ) -> Result<()> {
        let serializer = *self.cache.serializer();
        let mut size_delta: i64 = 0;

        for (key, change) in changes {
            let previous_size = self.document_sizes.get(key).copied().ok_or_else(|| {
                CacheError::Precondition(format!(
                    "cannot modify a document that wasn't read: {}",
                    key
                ))
            })?;

            match change {
                StagedChange::Upsert(maybe_document) => {
                    let read_time = read_time
                        .filter(|read_time| !read_time.is_min())
                        .ok_or_else(|| {
                            CacheError::Precondition(format!(
                                "cannot add a document with a read time of zero: {}",
                                key
                            ))
                        })?;
                    let record = serializer.to_db_remote_document(maybe_document, read_time);
                    let size = crate::codec::db_document_size(&record)?;
                    size_delta += size as i64 - previous_size as i64;
                    self.cache.add_entry(txn, key, record)?;
                }
                StagedChange::Removal => {
                    size_delta -= previous_size as i64;
                    if self.track_removals {
                        let read_time = read_time.ok_or_else(|| {
                            CacheError::Precondition(format!(
                                "cannot record a removal without a read time: {}",
                                key
                            ))
                        })?;
                        let deleted = MaybeDocument::NoDocument(NoDocument::new(
                            key.clone(),
                            SnapshotVersion::for_deleted_doc(),
                            false,
                        ));
                        let record = serializer.to_db_remote_document(&deleted, read_time);
                        self.cache.add_entry(txn, key, record)?;
                    } else {
                        self.cache.remove_entry(txn, key)?;
                    }
                }
            }
        }

        self.cache.update_metadata(txn, size_delta)?;
        tracing::debug!(
            "Applied {} document changes, size delta {}",
            changes.len(),
            size_delta
        );
        Ok(())
    }
}

/// Change buffer bound to a [`RemoteDocumentCache`]
pub type RemoteDocumentChangeBuffer<'a> = ChangeBuffer<SizeTrackingBackend<'a>>;

impl<'a> ChangeBuffer<SizeTrackingBackend<'a>> {
    pub fn for_cache(cache: &'a RemoteDocumentCache, track_removals: bool) -> Self {
        Self::new(SizeTrackingBackend::new(cache, track_removals))
    }
}
