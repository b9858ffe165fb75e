//! Tests for RemoteDocumentCache
//!
//! These tests verify:
//! - Point and batch reads, including the merge scan
//! - Collection range scans in both modes, with the depth filter
//! - The change feed and its watermark
//! - The size counter
//! - Collection-parent notifications

use doccache::codec::DbRemoteDocument;
use doccache::index::IndexManager;
use doccache::model::{FieldFilter, Operator, Value};
use doccache::store::{IterateOptions, IterationController, KeyRange, StoreTransaction};
use doccache::{CacheError, MaybeDocument, Query, ResourcePath, SnapshotVersion};
use serde_json::json;

use crate::{
    cache_size, doc, key, keys, missing, new_cache, remove_docs, version, write_docs,
};

fn query(path: &str) -> Query {
    Query::at_path(ResourcePath::from_string(path).unwrap())
}

// =============================================================================
// Point Read Tests
// =============================================================================

#[test]
fn test_get_entry_on_empty_cache() {
    let (store, cache, _) = new_cache();

    let result = store
        .run_read_transaction("get", |txn| cache.get_entry(txn, &key("rooms/abc")))
        .unwrap();

    assert_eq!(result, None);
}

#[test]
fn test_get_entry_returns_each_variant() {
    let (store, cache, _) = new_cache();
    let docs = vec![
        doc("rooms/a", 1, json!({"n": 1})),
        missing("rooms/b", 2),
        doccache::UnknownDocument::new(key("rooms/c"), version(3)).into(),
    ];
    write_docs(&store, &cache, docs.clone(), version(10)).unwrap();

    for expected in docs {
        let actual = store
            .run_read_transaction("get", |txn| cache.get_entry(txn, expected.key()))
            .unwrap();
        assert_eq!(actual, Some(expected));
    }
}

#[test]
fn test_get_sized_entry() {
    let (store, cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({"n": 1}))], version(10)).unwrap();

    let entry = store
        .run_read_transaction("get", |txn| cache.get_sized_entry(txn, &key("rooms/a")))
        .unwrap()
        .unwrap();

    assert_eq!(entry.maybe_document, doc("rooms/a", 1, json!({"n": 1})));
    assert_eq!(entry.size as i64, cache_size(&store, &cache));
}

// =============================================================================
// Batch Read Tests
// =============================================================================

#[test]
fn test_get_entries_returns_every_requested_key() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("rooms/b", 1, json!({})),
            doc("rooms/d", 1, json!({})),
            doc("rooms/f", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    let requested = keys(&["rooms/a", "rooms/b", "rooms/c", "rooms/d", "rooms/z"]);
    let results = store
        .run_read_transaction("get", |txn| cache.get_entries(txn, &requested))
        .unwrap();

    assert_eq!(results.len(), requested.len());
    assert_eq!(results[&key("rooms/a")], None);
    assert_eq!(results[&key("rooms/b")], Some(doc("rooms/b", 1, json!({}))));
    assert_eq!(results[&key("rooms/c")], None);
    assert_eq!(results[&key("rooms/d")], Some(doc("rooms/d", 1, json!({}))));
    assert_eq!(results[&key("rooms/z")], None);
    assert!(!results.contains_key(&key("rooms/f")));
}

#[test]
fn test_get_entries_on_empty_store() {
    let (store, cache, _) = new_cache();
    let requested = keys(&["rooms/a", "rooms/b"]);

    let results = store
        .run_read_transaction("get", |txn| cache.get_entries(txn, &requested))
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.values().all(Option::is_none));
}

#[test]
fn test_get_entries_with_no_keys() {
    let (store, cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();

    let results = store
        .run_read_transaction("get", |txn| cache.get_entries(txn, &keys(&[])))
        .unwrap();

    assert!(results.is_empty());
}

#[test]
fn test_get_entries_ignores_nested_rows_between_keys() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("rooms/a", 1, json!({})),
            doc("rooms/a/messages/m1", 1, json!({})),
            doc("rooms/b", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    let requested = keys(&["rooms/a", "rooms/b"]);
    let results = store
        .run_read_transaction("get", |txn| cache.get_entries(txn, &requested))
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.values().all(Option::is_some));
}

#[test]
fn test_get_entries_hides_sentinel_deletes() {
    let (store, cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();
    remove_docs(&store, &cache, &["rooms/a"], version(11), true).unwrap();

    let requested = keys(&["rooms/a"]);
    let results = store
        .run_read_transaction("get", |txn| cache.get_entries(txn, &requested))
        .unwrap();

    assert_eq!(results[&key("rooms/a")], None);
}

#[test]
fn test_get_sized_entries_reports_zero_for_missing() {
    let (store, cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({"n": 1}))], version(10)).unwrap();

    let requested = keys(&["rooms/a", "rooms/b"]);
    let entries = store
        .run_read_transaction("get", |txn| cache.get_sized_entries(txn, &requested))
        .unwrap();

    assert_eq!(entries.sizes[&key("rooms/b")], 0);
    assert_eq!(entries.sizes[&key("rooms/a")] as i64, cache_size(&store, &cache));
    assert!(entries.maybe_documents[&key("rooms/a")].is_some());
    assert!(entries.maybe_documents[&key("rooms/b")].is_none());
}

#[test]
fn test_get_entries_visits_only_requested_rows() {
    let (store, cache, _) = new_cache();
    let docs = (0..100)
        .map(|i| doc(&format!("rooms/{:03}", i), 1, json!({})))
        .collect();
    write_docs(&store, &cache, docs, version(10)).unwrap();

    let requested = keys(&["rooms/010", "rooms/050", "rooms/090"]);

    // Count rows the store hands to the merge scan through a wrapper.
    let visited = store
        .run_read_transaction("get", |txn| {
            let counting = CountingTransaction {
                inner: txn,
                visited: std::cell::Cell::new(0),
            };
            let results = cache.get_entries(&counting, &requested)?;
            assert_eq!(results.len(), 3);
            assert!(results.values().all(Option::is_some));
            Ok(counting.visited.get())
        })
        .unwrap();

    assert_eq!(visited, 3);
}

/// Read-only wrapper counting rows delivered by `iterate`
struct CountingTransaction<'a> {
    inner: &'a dyn StoreTransaction,
    visited: std::cell::Cell<usize>,
}

impl StoreTransaction for CountingTransaction<'_> {
    fn get(&self, key: &ResourcePath) -> doccache::Result<Option<DbRemoteDocument>> {
        self.inner.get(key)
    }

    fn put(&mut self, _key: &ResourcePath, _record: DbRemoteDocument) -> doccache::Result<()> {
        Err(CacheError::Transaction("read only".to_string()))
    }

    fn delete(&mut self, _key: &ResourcePath) -> doccache::Result<()> {
        Err(CacheError::Transaction("read only".to_string()))
    }

    fn iterate(
        &self,
        options: &IterateOptions,
        callback: &mut doccache::store::IterateCallback<'_>,
    ) -> doccache::Result<()> {
        self.inner.iterate(
            options,
            &mut |key: &ResourcePath,
                  record: &DbRemoteDocument,
                  control: &mut IterationController| {
                self.visited.set(self.visited.get() + 1);
                callback(key, record, control)
            },
        )
    }

    fn get_metadata(&self) -> doccache::Result<Option<doccache::codec::DbRemoteDocumentGlobal>> {
        self.inner.get_metadata()
    }

    fn put_metadata(
        &mut self,
        _metadata: doccache::codec::DbRemoteDocumentGlobal,
    ) -> doccache::Result<()> {
        Err(CacheError::Transaction("read only".to_string()))
    }
}

// =============================================================================
// Query Scan Tests
// =============================================================================

#[test]
fn test_query_returns_collection_documents() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("halls/x", 1, json!({})),
            doc("rooms/a", 1, json!({})),
            doc("rooms/b", 1, json!({})),
            missing("rooms/c", 1),
            doc("roomsX/d", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    let results = store
        .run_read_transaction("query", |txn| {
            cache.get_documents_matching_query(txn, &query("rooms"), SnapshotVersion::MIN)
        })
        .unwrap();

    let found: Vec<String> = results.keys().map(|k| k.to_string()).collect();
    assert_eq!(found, vec!["rooms/a", "rooms/b"]);
}

#[test]
fn test_query_excludes_nested_subcollections() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("collectionA/doc1", 1, json!({})),
            doc("collectionA/doc1/sub/doc2", 1, json!({})),
            doc("collectionA/doc3", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    for since in [SnapshotVersion::MIN, version(5)] {
        let results = store
            .run_read_transaction("query", |txn| {
                cache.get_documents_matching_query(txn, &query("collectionA"), since)
            })
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results.contains_key(&key("collectionA/doc1/sub/doc2")));
    }
}

#[test]
fn test_query_on_subcollection() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("rooms/a", 1, json!({})),
            doc("rooms/a/messages/m1", 1, json!({})),
            doc("rooms/a/messages/m2", 1, json!({})),
            doc("rooms/b/messages/m3", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    let results = store
        .run_read_transaction("query", |txn| {
            cache.get_documents_matching_query(txn, &query("rooms/a/messages"), SnapshotVersion::MIN)
        })
        .unwrap();

    let found: Vec<String> = results.keys().map(|k| k.to_string()).collect();
    assert_eq!(found, vec!["rooms/a/messages/m1", "rooms/a/messages/m2"]);
}

#[test]
fn test_query_since_read_time_uses_newer_rows_only() {
    let (store, cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/old", 1, json!({}))], version(10)).unwrap();
    write_docs(&store, &cache, vec![doc("rooms/mid", 1, json!({}))], version(20)).unwrap();
    write_docs(&store, &cache, vec![doc("rooms/new", 1, json!({}))], version(30)).unwrap();
    write_docs(&store, &cache, vec![doc("halls/new", 1, json!({}))], version(40)).unwrap();

    let results = store
        .run_read_transaction("query", |txn| {
            cache.get_documents_matching_query(txn, &query("rooms"), version(20))
        })
        .unwrap();

    let found: Vec<String> = results.keys().map(|k| k.to_string()).collect();
    assert_eq!(found, vec!["rooms/new"]);
}

#[test]
fn test_query_applies_filters() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("rooms/a", 1, json!({"topic": "rust"})),
            doc("rooms/b", 1, json!({"topic": "go"})),
        ],
        version(10),
    )
    .unwrap();

    let filtered = query("rooms").with_filter(FieldFilter::new(
        "topic",
        Operator::Equal,
        Value::StringValue("rust".to_string()),
    ));
    let results = store
        .run_read_transaction("query", |txn| {
            cache.get_documents_matching_query(txn, &filtered, SnapshotVersion::MIN)
        })
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results.contains_key(&key("rooms/a")));
}

#[test]
fn test_query_rejects_collection_group() {
    let (store, cache, _) = new_cache();

    let result = store.run_read_transaction("query", |txn| {
        cache.get_documents_matching_query(
            txn,
            &Query::collection_group("messages"),
            SnapshotVersion::MIN,
        )
    });

    assert!(matches!(result, Err(CacheError::Precondition(_))));
}

// =============================================================================
// Change Feed Tests
// =============================================================================

#[test]
fn test_start_on_empty_store_uses_sentinel_watermark() {
    let (store, mut cache, _) = new_cache();

    store.run_read_transaction("start", |txn| cache.start(txn)).unwrap();

    assert_eq!(
        cache.last_processed_read_time(),
        SnapshotVersion::for_deleted_doc()
    );
}

#[test]
fn test_start_skips_existing_changes() {
    let (store, mut cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();
    write_docs(&store, &cache, vec![doc("rooms/b", 1, json!({}))], version(20)).unwrap();

    store.run_read_transaction("start", |txn| cache.start(txn)).unwrap();
    let changes = store
        .run_read_transaction("changes", |txn| cache.get_new_document_changes(txn))
        .unwrap();

    assert_eq!(cache.last_processed_read_time(), version(20));
    assert!(changes.is_empty());
}

#[test]
fn test_change_feed_returns_each_change_once() {
    let (store, mut cache, _) = new_cache();
    store.run_read_transaction("start", |txn| cache.start(txn)).unwrap();

    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();
    let first = store
        .run_read_transaction("changes", |txn| cache.get_new_document_changes(txn))
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(cache.last_processed_read_time(), version(10));

    let again = store
        .run_read_transaction("changes", |txn| cache.get_new_document_changes(txn))
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(cache.last_processed_read_time(), version(10));

    write_docs(
        &store,
        &cache,
        vec![doc("rooms/a", 2, json!({"v": 2})), doc("rooms/b", 1, json!({}))],
        version(20),
    )
    .unwrap();
    let second = store
        .run_read_transaction("changes", |txn| cache.get_new_document_changes(txn))
        .unwrap();

    assert_eq!(second.len(), 2);
    assert_eq!(second[&key("rooms/a")], doc("rooms/a", 2, json!({"v": 2})));
    assert_eq!(cache.last_processed_read_time(), version(20));
}

#[test]
fn test_change_feed_includes_sentinel_deletes() {
    let (store, mut cache, _) = new_cache();
    write_docs(&store, &cache, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();
    store.run_read_transaction("start", |txn| cache.start(txn)).unwrap();

    remove_docs(&store, &cache, &["rooms/a"], version(20), true).unwrap();
    let changes = store
        .run_read_transaction("changes", |txn| cache.get_new_document_changes(txn))
        .unwrap();

    let change = &changes[&key("rooms/a")];
    assert!(change.is_sentinel_delete());
    assert!(matches!(change, MaybeDocument::NoDocument(_)));
}

#[test]
fn test_independent_caches_have_independent_watermarks() {
    let (store, mut first, index_manager) = new_cache();
    let mut second = doccache::RemoteDocumentCache::new(
        doccache::LocalSerializer::new(),
        index_manager.clone(),
    );
    store.run_read_transaction("start", |txn| first.start(txn)).unwrap();
    store.run_read_transaction("start", |txn| second.start(txn)).unwrap();

    write_docs(&store, &first, vec![doc("rooms/a", 1, json!({}))], version(10)).unwrap();
    let from_first = store
        .run_read_transaction("changes", |txn| first.get_new_document_changes(txn))
        .unwrap();
    let from_second = store
        .run_read_transaction("changes", |txn| second.get_new_document_changes(txn))
        .unwrap();

    assert_eq!(from_first.len(), 1);
    assert_eq!(from_second.len(), 1);
}

// =============================================================================
// Size and Index Tests
// =============================================================================

#[test]
fn test_size_starts_at_zero() {
    let (store, cache, _) = new_cache();

    assert_eq!(cache_size(&store, &cache), 0);
}

#[test]
fn test_missing_metadata_is_corruption() {
    let (store, cache, _) = new_cache();

    let result = store.run_read_transaction("size", |txn| {
        cache.get_size(&NoMetadata { inner: txn })
    });

    assert!(matches!(result, Err(CacheError::Corruption(_))));
}

/// Wrapper hiding the metadata row
struct NoMetadata<'a> {
    inner: &'a dyn StoreTransaction,
}

impl StoreTransaction for NoMetadata<'_> {
    fn get(&self, key: &ResourcePath) -> doccache::Result<Option<DbRemoteDocument>> {
        self.inner.get(key)
    }

    fn put(&mut self, _key: &ResourcePath, _record: DbRemoteDocument) -> doccache::Result<()> {
        Ok(())
    }

    fn delete(&mut self, _key: &ResourcePath) -> doccache::Result<()> {
        Ok(())
    }

    fn iterate(
        &self,
        options: &IterateOptions,
        callback: &mut doccache::store::IterateCallback<'_>,
    ) -> doccache::Result<()> {
        self.inner.iterate(options, callback)
    }

    fn get_metadata(&self) -> doccache::Result<Option<doccache::codec::DbRemoteDocumentGlobal>> {
        Ok(None)
    }

    fn put_metadata(
        &mut self,
        _metadata: doccache::codec::DbRemoteDocumentGlobal,
    ) -> doccache::Result<()> {
        Ok(())
    }
}

#[test]
fn test_writes_notify_collection_parent_index() {
    let (store, cache, index_manager) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![
            doc("rooms/a/messages/m1", 1, json!({})),
            doc("halls/b/messages/m2", 1, json!({})),
            doc("rooms/a", 1, json!({})),
        ],
        version(10),
    )
    .unwrap();

    let parents = store
        .run_read_transaction("parents", |txn| {
            index_manager.get_collection_parents(txn, "messages")
        })
        .unwrap();

    assert_eq!(
        parents,
        vec![
            ResourcePath::from_string("halls/b").unwrap(),
            ResourcePath::from_string("rooms/a").unwrap(),
        ]
    );
}

#[test]
fn test_scan_over_all_rows_sees_every_write() {
    let (store, cache, _) = new_cache();
    write_docs(
        &store,
        &cache,
        vec![doc("rooms/a", 1, json!({})), doc("rooms/b", 1, json!({}))],
        version(10),
    )
    .unwrap();

    let count = store
        .run_read_transaction("count", |txn| {
            let mut count = 0;
            txn.iterate(
                &IterateOptions::primary(KeyRange::all()),
                &mut |_key: &ResourcePath,
                      _record: &DbRemoteDocument,
                      _control: &mut IterationController| {
                    count += 1;
                    Ok(())
                },
            )?;
            Ok(count)
        })
        .unwrap();

    assert_eq!(count, 2);
}
