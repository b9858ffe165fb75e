//! Cache Module
//!
//! The remote document cache and its change buffer.
//!
//! ## Responsibilities
//! - Point, batch and collection-range reads of cached server documents
//! - The change feed (every row written after a watermark)
//! - Staged, single-use writes with exact byte-size accounting
//!
//! ## Write path
//! ```text
//! caller ──► ChangeBuffer ──apply()──► RemoteDocumentCache ──► StoreTransaction
//!               │   ▲                     add_entry / remove_entry
//!               │   └── reads through,    update_metadata
//!               ▼       records sizes
//!            overlay
//! ```

mod change_buffer;
mod remote_document_cache;

use std::collections::BTreeMap;

pub use change_buffer::{
    ChangeBuffer, ChangeBufferBackend, RemoteDocumentChangeBuffer, SizeTrackingBackend,
    StagedChange, StagedChanges,
};
pub use remote_document_cache::RemoteDocumentCache;

use crate::model::{Document, DocumentKey, MaybeDocument};

/// Batch read result; `None` means not cached
pub type NullableMaybeDocumentMap = BTreeMap<DocumentKey, Option<MaybeDocument>>;

/// Change feed result, sentinel deletes included
pub type MaybeDocumentMap = BTreeMap<DocumentKey, MaybeDocument>;

/// Query result
pub type DocumentMap = BTreeMap<DocumentKey, Document>;

/// A cached entry and the size it contributes to the cache
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSizeEntry {
    pub maybe_document: MaybeDocument,
    pub size: usize,
}

/// Batch read result with per-key sizes (0 when not cached)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSizeEntries {
    pub maybe_documents: NullableMaybeDocumentMap,
    pub sizes: BTreeMap<DocumentKey, usize>,
}
