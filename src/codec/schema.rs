//! Persisted record shapes
//!
//! These are the rows the store holds. Field names serialize in camelCase so
//! the canonical JSON form used for sizing is stable across releases.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::model::{ResourcePath, WireDocument};

/// Sortable `(seconds, nanoseconds)` key used for range bounds and indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DbTimestampKey {
    pub seconds: i64,
    pub nanoseconds: i32,
}

/// Timestamp stored inside no-document / unknown-document payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTimestamp {
    pub seconds: i64,
    pub nanoseconds: i32,
}

/// Marker for a document known to be missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNoDocument {
    pub path: ResourcePath,
    pub read_time: DbTimestamp,
}

/// Marker for a document known to exist with unknown contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUnknownDocument {
    pub path: ResourcePath,
    pub version: DbTimestamp,
}

/// One row of the remote document table, keyed by document path
///
/// Exactly one of `unknown_document`, `no_document` and `document` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRemoteDocument {
    pub unknown_document: Option<DbUnknownDocument>,
    pub no_document: Option<DbNoDocument>,
    pub document: Option<WireDocument>,
    pub has_committed_mutations: bool,
    /// Absent only on rows written before read times were tracked
    pub read_time: Option<DbTimestampKey>,
    /// Collection path of the document; feeds the collection read-time index
    pub parent_path: ResourcePath,
}

/// Borrowed view of the single populated payload slot
#[derive(Debug, Clone, Copy)]
pub enum RemoteDocumentPayload<'a> {
    Document(&'a WireDocument),
    NoDocument(&'a DbNoDocument),
    UnknownDocument(&'a DbUnknownDocument),
}

impl DbRemoteDocument {
    /// The populated payload slot, checked in fixed priority order
    ///
    /// Zero or several populated slots mean the row is corrupt.
    pub fn payload(&self) -> Result<RemoteDocumentPayload<'_>> {
        let populated = usize::from(self.document.is_some())
            + usize::from(self.no_document.is_some())
            + usize::from(self.unknown_document.is_some());
        if populated > 1 {
            return Err(CacheError::Corruption(format!(
                "remote document row has {} payload variants populated",
                populated
            )));
        }

        if let Some(doc) = &self.document {
            Ok(RemoteDocumentPayload::Document(doc))
        } else if let Some(doc) = &self.no_document {
            Ok(RemoteDocumentPayload::NoDocument(doc))
        } else if let Some(doc) = &self.unknown_document {
            Ok(RemoteDocumentPayload::UnknownDocument(doc))
        } else {
            Err(CacheError::Corruption(
                "remote document row has no payload variant populated".to_string(),
            ))
        }
    }
}

/// The single cache metadata row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRemoteDocumentGlobal {
    /// Sum of the approximate sizes of all cached rows
    pub byte_size: i64,
}
