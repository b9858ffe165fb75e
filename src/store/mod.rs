//! Store Module
//!
//! The ordered transactional store the cache runs on.
//!
//! ## Responsibilities
//! - Point get/put/delete of remote document rows by path
//! - Ordered iteration over the primary key or a secondary index
//! - Per-row cursor control: skip forward to a key, or stop
//! - The single cache metadata row
//!
//! ## Indexes
//! ```text
//! Primary              path                          → row
//! ReadTime             readTime                      → row
//! CollectionReadTime   (parentPath, readTime)        → row
//! ```
//!
//! Every call happens inside a transaction owned by the caller; nothing a
//! transaction writes is visible to others before it commits.

mod memory;
mod snapshot;

use std::ops::Bound;

pub use memory::{MemoryStore, SnapshotStats};

use crate::codec::{DbRemoteDocument, DbRemoteDocumentGlobal, DbTimestampKey};
use crate::error::Result;
use crate::model::ResourcePath;

/// Index to iterate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteDocumentIndex {
    /// Rows in path order
    Primary,
    /// Rows in read-time order (rows without a read time are absent)
    ReadTime,
    /// Rows grouped by collection, then in read-time order
    CollectionReadTime,
}

/// A key in one of the indexes; its variant must match the index scanned
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Path(ResourcePath),
    ReadTime(DbTimestampKey),
    CollectionReadTime(ResourcePath, DbTimestampKey),
}

/// Bounds of a scan in index-key space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl KeyRange {
    /// The whole index
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Keys at or after `key` (strictly after when `open`)
    pub fn lower_bound(key: IndexKey, open: bool) -> Self {
        Self {
            lower: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
            upper: Bound::Unbounded,
        }
    }

    /// Keys between `lower` and `upper`, both inclusive
    pub fn bound(lower: IndexKey, upper: IndexKey) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }
}

/// What to scan and in which direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterateOptions {
    pub index: RemoteDocumentIndex,
    pub range: KeyRange,
    pub reverse: bool,
}

impl IterateOptions {
    pub fn primary(range: KeyRange) -> Self {
        Self::with_index(RemoteDocumentIndex::Primary, range)
    }

    pub fn with_index(index: RemoteDocumentIndex, range: KeyRange) -> Self {
        Self {
            index,
            range,
            reverse: false,
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Cursor control handed to every iteration callback
#[derive(Debug, Default)]
pub struct IterationController {
    action: Option<IterationAction>,
}

/// What the cursor does after the current row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationAction {
    /// Move to the first row whose index key is at or after the given key
    Skip(IndexKey),
    /// Stop iterating
    Done,
}

impl IterationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue at the first row whose index key is `>= key` in scan order
    pub fn skip(&mut self, key: IndexKey) {
        self.action = Some(IterationAction::Skip(key));
    }

    /// Stop after the current row
    pub fn done(&mut self) {
        self.action = Some(IterationAction::Done);
    }

    /// Consume the requested action; `None` means "next row"
    pub fn take_action(&mut self) -> Option<IterationAction> {
        self.action.take()
    }
}

/// Per-row callback: primary key, row, cursor control
pub type IterateCallback<'a> =
    dyn FnMut(&ResourcePath, &DbRemoteDocument, &mut IterationController) -> Result<()> + 'a;

/// Access to the remote document tables within one transaction
pub trait StoreTransaction {
    fn get(&self, key: &ResourcePath) -> Result<Option<DbRemoteDocument>>;

    fn put(&mut self, key: &ResourcePath, record: DbRemoteDocument) -> Result<()>;

    fn delete(&mut self, key: &ResourcePath) -> Result<()>;

    /// Visit rows in index order; an `Err` from the callback aborts the scan
    fn iterate(&self, options: &IterateOptions, callback: &mut IterateCallback<'_>) -> Result<()>;

    fn get_metadata(&self) -> Result<Option<DbRemoteDocumentGlobal>>;

    fn put_metadata(&mut self, metadata: DbRemoteDocumentGlobal) -> Result<()>;
}
