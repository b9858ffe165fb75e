//! Remote document cache
//!
//! Reads by key, by key set and by collection range, an exact aggregate
//! size counter, and a forward-only change feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::codec::{
    db_document_size, DbRemoteDocument, DbRemoteDocumentGlobal, LocalSerializer,
};
use crate::error::{CacheError, Result};
use crate::index::IndexManager;
use crate::model::{DocumentKey, MaybeDocument, Query, ResourcePath, SnapshotVersion};
use crate::store::{
    IndexKey, IterateOptions, IterationController, KeyRange, RemoteDocumentIndex,
    StoreTransaction,
};

use super::change_buffer::RemoteDocumentChangeBuffer;
use super::{
    DocumentMap, DocumentSizeEntries, DocumentSizeEntry, MaybeDocumentMap,
    NullableMaybeDocumentMap,
};

/// Cache of server documents on top of a [`StoreTransaction`]
///
/// Writes only happen through a change buffer from
/// [`RemoteDocumentCache::new_change_buffer`], which keeps the size counter
/// exact.
///
/// ## State
/// The only mutable state is the change-feed watermark. One instance means
/// one replay position; consumers needing independent positions need their
/// own instances.
pub struct RemoteDocumentCache {
    serializer: LocalSerializer,

    /// Notified with the collection path of every row written
    index_manager: Arc<dyn IndexManager>,

    /// Read time of the last row consumed by `get_new_document_changes()`
    last_processed_read_time: SnapshotVersion,
}

impl RemoteDocumentCache {
    pub fn new(serializer: LocalSerializer, index_manager: Arc<dyn IndexManager>) -> Self {
        Self {
            serializer,
            index_manager,
            last_processed_read_time: SnapshotVersion::MIN,
        }
    }

    pub fn serializer(&self) -> &LocalSerializer {
        &self.serializer
    }

    /// Starts up the cache
    ///
    /// Moves the watermark to the newest read time in the store, so changes
    /// that existed before startup are not reported by
    /// `get_new_document_changes()`. An empty store leaves the watermark at
    /// the sentinel-delete version.
    pub fn start(&mut self, txn: &dyn StoreTransaction) -> Result<()> {
        let serializer = self.serializer;
        let mut last_read_time = SnapshotVersion::for_deleted_doc();

        let options = IterateOptions::with_index(RemoteDocumentIndex::ReadTime, KeyRange::all())
            .reversed();
        txn.iterate(
            &options,
            &mut |_key: &ResourcePath,
                  record: &DbRemoteDocument,
                  control: &mut IterationController| {
                if let Some(read_time) = record.read_time {
                    last_read_time = serializer.from_db_timestamp_key(read_time)?;
                }
                control.done();
                Ok(())
            },
        )?;

        self.last_processed_read_time = last_read_time;
        tracing::debug!(
            "Remote document cache started, last processed read time {}",
            self.last_processed_read_time
        );
        Ok(())
    }

    /// Watermark of the change feed
    pub fn last_processed_read_time(&self) -> SnapshotVersion {
        self.last_processed_read_time
    }

    // =========================================================================
    // Write entry points (change buffer only)
    // =========================================================================

    /// Write a row and notify the collection-parent index
    pub(crate) fn add_entry(
        &self,
        txn: &mut dyn StoreTransaction,
        key: &DocumentKey,
        record: DbRemoteDocument,
    ) -> Result<()> {
        txn.put(key.path(), record)?;
        self.index_manager
            .add_to_collection_parent_index(txn, &key.collection_path())
    }

    pub(crate) fn remove_entry(
        &self,
        txn: &mut dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<()> {
        txn.delete(key.path())
    }

    /// Add `size_delta` to the stored byte size
    pub(crate) fn update_metadata(
        &self,
        txn: &mut dyn StoreTransaction,
        size_delta: i64,
    ) -> Result<()> {
        let mut metadata = self.get_metadata(txn)?;
        metadata.byte_size += size_delta;
        txn.put_metadata(metadata)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up one entry; sentinel deletes read as `None`
    pub fn get_entry(
        &self,
        txn: &dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<Option<MaybeDocument>> {
        let record = txn.get(key.path())?;
        self.serializer.maybe_decode_document(record.as_ref())
    }

    /// Look up one entry together with its size
    pub fn get_sized_entry(
        &self,
        txn: &dyn StoreTransaction,
        key: &DocumentKey,
    ) -> Result<Option<DocumentSizeEntry>> {
        let Some(record) = txn.get(key.path())? else {
            return Ok(None);
        };
        let Some(maybe_document) = self.serializer.maybe_decode_document(Some(&record))? else {
            return Ok(None);
        };
        Ok(Some(DocumentSizeEntry {
            maybe_document,
            size: db_document_size(&record)?,
        }))
    }

    /// Look up several entries; every requested key is present in the result
    pub fn get_entries(
        &self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
    ) -> Result<NullableMaybeDocumentMap> {
        let mut results = NullableMaybeDocumentMap::new();
        self.for_each_db_entry(txn, keys, |key, record| {
            let doc = self.serializer.maybe_decode_document(record)?;
            results.insert(key.clone(), doc);
            Ok(())
        })?;
        Ok(results)
    }

    /// Like `get_entries`, plus each entry's size (0 when absent)
    pub fn get_sized_entries(
        &self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
    ) -> Result<DocumentSizeEntries> {
        let mut entries = DocumentSizeEntries::default();
        self.for_each_db_entry(txn, keys, |key, record| {
            match (self.serializer.maybe_decode_document(record)?, record) {
                (Some(doc), Some(record)) => {
                    entries.sizes.insert(key.clone(), db_document_size(record)?);
                    entries.maybe_documents.insert(key.clone(), Some(doc));
                }
                _ => {
                    entries.sizes.insert(key.clone(), 0);
                    entries.maybe_documents.insert(key.clone(), None);
                }
            }
            Ok(())
        })?;
        Ok(entries)
    }

    /// Merge-scan the sorted key set against the path-ordered rows
    ///
    /// Calls `callback` exactly once per requested key, in key order, with
    /// the stored row or `None`. One range scan bounded by the first and
    /// last key; the cursor skips straight to the next requested key.
    fn for_each_db_entry<F>(
        &self,
        txn: &dyn StoreTransaction,
        keys: &BTreeSet<DocumentKey>,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&DocumentKey, Option<&DbRemoteDocument>) -> Result<()>,
    {
        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Ok(());
        };

        let range = KeyRange::bound(
            IndexKey::Path(first.path().clone()),
            IndexKey::Path(last.path().clone()),
        );
        let mut pending = keys.iter().peekable();

        txn.iterate(
            &IterateOptions::primary(range),
            &mut |stored_key: &ResourcePath,
                  record: &DbRemoteDocument,
                  control: &mut IterationController| {
                // Requested keys before this row are not cached.
                while let Some(key) = pending.next_if(|key| key.path() < stored_key) {
                    callback(key, None)?;
                }

                if let Some(key) = pending.next_if(|key| key.path() == stored_key) {
                    callback(key, Some(record))?;
                }

                match pending.peek() {
                    Some(next) => control.skip(IndexKey::Path(next.path().clone())),
                    None => control.done(),
                }
                Ok(())
            },
        )?;

        // Whatever the scan never reached (e.g. an empty store) is missing.
        for key in pending {
            callback(key, None)?;
        }
        Ok(())
    }

    /// Documents of `query`'s collection that match it
    ///
    /// With `since_read_time == MIN` this is a prefix scan over paths.
    /// Otherwise only rows with a read time after `since_read_time` are
    /// visited, through the collection read-time index.
    pub fn get_documents_matching_query(
        &self,
        txn: &dyn StoreTransaction,
        query: &Query,
        since_read_time: SnapshotVersion,
    ) -> Result<DocumentMap> {
        if query.is_collection_group_query() {
            return Err(CacheError::Precondition(
                "collection group queries must be split into collection queries".to_string(),
            ));
        }

        let mut results = DocumentMap::new();
        let immediate_children_path_length = query.path().len() + 1;

        let options = if since_read_time.is_min() {
            IterateOptions::primary(KeyRange::lower_bound(
                IndexKey::Path(query.path().clone()),
                false,
            ))
        } else {
            let read_time_key = self.serializer.to_db_timestamp_key(since_read_time);
            IterateOptions::with_index(
                RemoteDocumentIndex::CollectionReadTime,
                KeyRange::lower_bound(
                    IndexKey::CollectionReadTime(query.path().clone(), read_time_key),
                    true,
                ),
            )
        };

        txn.iterate(
            &options,
            &mut |key: &ResourcePath,
                  record: &DbRemoteDocument,
                  control: &mut IterationController| {
                if !query.path().is_prefix_of(key) {
                    control.done();
                    return Ok(());
                }
                // Rows in subcollections sort inside the scanned range too;
                // only direct children of the collection count.
                if key.len() != immediate_children_path_length {
                    return Ok(());
                }

                let maybe_doc = self.serializer.from_db_remote_document(record)?;
                if let MaybeDocument::Document(doc) = maybe_doc {
                    if query.matches(&doc) {
                        results.insert(doc.key().clone(), doc);
                    }
                }
                Ok(())
            },
        )?;

        tracing::trace!(
            "Query on {} since {} matched {} documents",
            query.path(),
            since_read_time,
            results.len()
        );
        Ok(results)
    }

    /// Every row written after the watermark, sentinel deletes included
    ///
    /// Advances the watermark to the newest read time returned. A failed
    /// scan leaves the watermark where it was.
    pub fn get_new_document_changes(
        &mut self,
        txn: &dyn StoreTransaction,
    ) -> Result<MaybeDocumentMap> {
        let serializer = self.serializer;
        let mut changed_docs = MaybeDocumentMap::new();
        let mut last_read_time = self.last_processed_read_time;

        let range = KeyRange::lower_bound(
            IndexKey::ReadTime(serializer.to_db_timestamp_key(last_read_time)),
            true,
        );
        txn.iterate(
            &IterateOptions::with_index(RemoteDocumentIndex::ReadTime, range),
            &mut |_key: &ResourcePath,
                  record: &DbRemoteDocument,
                  _control: &mut IterationController| {
                let doc = serializer.from_db_remote_document(record)?;
                if let Some(read_time) = record.read_time {
                    let read_time = serializer.from_db_timestamp_key(read_time)?;
                    last_read_time = last_read_time.max(read_time);
                }
                changed_docs.insert(doc.key().clone(), doc);
                Ok(())
            },
        )?;

        if !changed_docs.is_empty() {
            tracing::debug!(
                "Change feed returned {} documents, last processed read time {} -> {}",
                changed_docs.len(),
                self.last_processed_read_time,
                last_read_time
            );
        }
        self.last_processed_read_time = last_read_time;
        Ok(changed_docs)
    }

    /// Staging buffer bound to this cache
    ///
    /// With `track_removals`, removals are written as sentinel deletes that
    /// only the change feed reports.
    pub fn new_change_buffer(&self, track_removals: bool) -> RemoteDocumentChangeBuffer<'_> {
        RemoteDocumentChangeBuffer::for_cache(self, track_removals)
    }

    /// Aggregate approximate size of all rows
    pub fn get_size(&self, txn: &dyn StoreTransaction) -> Result<i64> {
        Ok(self.get_metadata(txn)?.byte_size)
    }

    fn get_metadata(&self, txn: &dyn StoreTransaction) -> Result<DbRemoteDocumentGlobal> {
        txn.get_metadata()?
            .ok_or_else(|| CacheError::Corruption("missing document cache metadata".to_string()))
    }
}
