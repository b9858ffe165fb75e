//! Persistence Module
//!
//! Owns the store, the collection-parent index and the snapshot file.
//!
//! ## Responsibilities
//! - Open or create the data directory and load the last snapshot
//! - Run read-write and read-only transactions
//! - Hand out started remote document caches
//! - Snapshot the store according to the configured strategy

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::RemoteDocumentCache;
use crate::codec::{DbRemoteDocument, LocalSerializer};
use crate::config::{Config, SnapshotStrategy};
use crate::error::Result;
use crate::index::{IndexManager, MemoryIndexManager};
use crate::model::ResourcePath;
use crate::store::{
    IterateOptions, IterationController, KeyRange, MemoryStore, SnapshotStats, StoreTransaction,
};

/// Entry point for a doccache data directory
///
/// ## Concurrency
/// Read-write transactions are serialized by the store; read-only
/// transactions run concurrently with each other. A snapshot waits for the
/// running read-write transaction, so it never captures a partial commit.
pub struct Persistence {
    config: Config,

    /// `{data_dir}/remote_documents.snap`
    snapshot_path: PathBuf,

    store: MemoryStore,

    index_manager: Arc<MemoryIndexManager>,

    serializer: LocalSerializer,
}

impl Persistence {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const SNAPSHOT_FILENAME: &'static str = "remote_documents.snap";

    /// Open or create a persistence instance with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Load the snapshot if one exists, else start empty
    /// 3. Rebuild the collection-parent index from the loaded rows
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Config and directory
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let snapshot_path = config.data_dir.join(Self::SNAPSHOT_FILENAME);

        // Step 2: Store
        let store = if snapshot_path.exists() {
            let store = MemoryStore::load_snapshot(&snapshot_path)?;
            tracing::info!(
                "Loaded {} remote documents from {}",
                store.document_count(),
                snapshot_path.display()
            );
            store
        } else {
            tracing::debug!("No snapshot at {}, starting empty", snapshot_path.display());
            MemoryStore::new()
        };

        // Step 3: Collection-parent index
        let index_manager = Arc::new(MemoryIndexManager::new());
        let parents = store.run_read_transaction("rebuild collection parents", |txn| {
            rebuild_collection_parents(txn, &index_manager)
        })?;
        if parents > 0 {
            tracing::debug!("Rebuilt {} collection parent entries", parents);
        }

        Ok(Self {
            config,
            snapshot_path,
            store,
            index_manager,
            serializer: LocalSerializer::new(),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// A remote document cache with its watermark reseeded from the store
    ///
    /// Each call returns an independent instance with its own change-feed
    /// position.
    pub fn remote_document_cache(&self) -> Result<RemoteDocumentCache> {
        let index_manager: Arc<dyn IndexManager> = self.index_manager.clone();
        let mut cache = RemoteDocumentCache::new(self.serializer, index_manager);
        self.store
            .run_read_transaction("start remote document cache", |txn| cache.start(txn))?;
        Ok(cache)
    }

    /// Run `action` in a read-write transaction
    ///
    /// All writes commit together when `action` returns `Ok`, and none do
    /// otherwise. A snapshot may follow the commit, per the strategy.
    ///
    /// The result only reflects the commit. A failed snapshot is logged and
    /// retried at the next due commit or at `close()`.
    pub fn run_transaction<R>(
        &self,
        name: &str,
        action: impl FnOnce(&mut dyn StoreTransaction) -> Result<R>,
    ) -> Result<R> {
        let result = self.store.run_transaction(name, action)?;
        if let Err(e) = self.maybe_snapshot() {
            tracing::warn!(
                "Transaction '{}' committed but the snapshot failed: {}",
                name,
                e
            );
        }
        Ok(result)
    }

    /// Run `action` in a read-only transaction
    pub fn run_read_transaction<R>(
        &self,
        name: &str,
        action: impl FnOnce(&dyn StoreTransaction) -> Result<R>,
    ) -> Result<R> {
        self.store.run_read_transaction(name, action)
    }

    /// Parent paths of every cached collection called `collection_id`
    pub fn collection_parents(&self, collection_id: &str) -> Result<Vec<ResourcePath>> {
        self.store
            .run_read_transaction("collection parents", |txn| {
                self.index_manager.get_collection_parents(txn, collection_id)
            })
    }

    /// Write the store to the snapshot file now
    pub fn snapshot(&self) -> Result<SnapshotStats> {
        let stats = self.store.save_snapshot(&self.snapshot_path)?;
        tracing::debug!(
            "Snapshot written: {} documents, {} bytes",
            stats.documents,
            stats.bytes
        );
        Ok(stats)
    }

    /// Write a final snapshot and release the instance
    pub fn close(self) -> Result<()> {
        let stats = self.snapshot()?;
        tracing::info!(
            "Closed {} with {} remote documents",
            self.config.data_dir.display(),
            stats.documents
        );
        Ok(())
    }

    fn maybe_snapshot(&self) -> Result<()> {
        let due = match self.config.snapshot_strategy {
            SnapshotStrategy::EveryCommit => true,
            SnapshotStrategy::EveryNCommits { count } => {
                self.store.commit_count() % count as u64 == 0
            }
            SnapshotStrategy::OnClose => false,
        };
        if due {
            self.snapshot()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn index_manager(&self) -> &Arc<MemoryIndexManager> {
        &self.index_manager
    }

    pub fn serializer(&self) -> LocalSerializer {
        self.serializer
    }
}

/// Register the collection of every row; returns the number of new entries
fn rebuild_collection_parents(
    txn: &dyn StoreTransaction,
    index_manager: &MemoryIndexManager,
) -> Result<usize> {
    let mut added = 0;
    txn.iterate(
        &IterateOptions::primary(KeyRange::all()),
        &mut |_key: &ResourcePath,
              record: &DbRemoteDocument,
              _control: &mut IterationController| {
            if index_manager.add_collection_parent(&record.parent_path) {
                added += 1;
            }
            Ok(())
        },
    )?;
    Ok(added)
}
