//! # doccache
//!
//! Durable local cache of server-authoritative documents for an
//! offline-first document database client:
//! - Point, batch (merge-scan) and collection-range reads
//! - A forward-only change feed with sentinel deletes
//! - Single-use change buffers with exact byte-size accounting
//! - An ordered transactional store with snapshot persistence
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Callers (mutation queue, query engine,           │
//! │                  sync engine, doccache-cli)                 │
//! └─────────────┬──────────────────────────────┬────────────────┘
//!               │ reads                        │ writes
//!               │                              ▼
//!               │                     ┌─────────────────┐
//!               │                     │  ChangeBuffer   │
//!               │                     │ (overlay, sizes)│
//!               │                     └────────┬────────┘
//!               ▼                              ▼ apply()
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RemoteDocumentCache                         │
//! │        (LocalSerializer, watermark, IndexManager)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ StoreTransaction
//!                       ▼
//!               ┌───────────────┐        ┌──────────────────┐
//!               │  MemoryStore  │───────►│  Snapshot file   │
//!               │ (RwLock, idx) │        │ (bincode + CRC)  │
//!               └───────────────┘        └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod model;
pub mod codec;
pub mod store;
pub mod index;
pub mod cache;
pub mod persistence;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{Config, SnapshotStrategy};
pub use cache::{ChangeBuffer, RemoteDocumentCache, RemoteDocumentChangeBuffer};
pub use codec::LocalSerializer;
pub use model::{
    Document, DocumentKey, MaybeDocument, NoDocument, Query, ResourcePath, SnapshotVersion,
    UnknownDocument,
};
pub use persistence::Persistence;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of doccache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
