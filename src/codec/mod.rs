//! Codec Module
//!
//! Maps the document model onto persisted rows.
//!
//! ## Row Layout
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ DbRemoteDocument (keyed by document path)                 │
//! │   exactly one of:                                         │
//! │     document        WireDocument (opaque remote payload)  │
//! │     noDocument      { path, readTime: DbTimestamp }       │
//! │     unknownDocument { path, version:  DbTimestamp }       │
//! │   hasCommittedMutations                                   │
//! │   readTime    DbTimestampKey  → read-time index           │
//! │   parentPath  ResourcePath    → collection read-time index│
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Sizes are the canonical JSON length of the populated payload slot.

mod schema;
mod serializer;

pub use schema::{
    DbNoDocument, DbRemoteDocument, DbRemoteDocumentGlobal, DbTimestamp, DbTimestampKey,
    DbUnknownDocument, RemoteDocumentPayload,
};
pub use serializer::{db_document_size, LocalSerializer};
