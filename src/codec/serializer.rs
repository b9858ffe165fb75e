//! Local serializer
//!
//! Converts between `MaybeDocument` and `DbRemoteDocument` rows, and between
//! snapshot versions and their two persisted timestamp forms.

use crate::error::{CacheError, Result};
use crate::model::{
    Document, DocumentKey, MaybeDocument, NoDocument, SnapshotVersion, Timestamp,
    UnknownDocument,
};

use super::schema::{
    DbNoDocument, DbRemoteDocument, DbTimestamp, DbTimestampKey, DbUnknownDocument,
    RemoteDocumentPayload,
};

/// Serializer for rows stored in the remote document table
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSerializer;

impl LocalSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Decode a row, keeping sentinel deletes
    pub fn from_db_remote_document(&self, remote_doc: &DbRemoteDocument) -> Result<MaybeDocument> {
        match remote_doc.payload()? {
            RemoteDocumentPayload::Document(proto) => {
                let doc = Document::from_wire(proto.clone(), remote_doc.has_committed_mutations)
                    .map_err(|e| {
                        CacheError::Corruption(format!("undecodable stored document: {}", e))
                    })?;
                Ok(MaybeDocument::Document(doc))
            }
            RemoteDocumentPayload::NoDocument(no_doc) => {
                let key = self.decode_key(&no_doc.path)?;
                let version = self.from_db_timestamp(no_doc.read_time)?;
                Ok(MaybeDocument::NoDocument(NoDocument::new(
                    key,
                    version,
                    remote_doc.has_committed_mutations,
                )))
            }
            RemoteDocumentPayload::UnknownDocument(unknown) => {
                let key = self.decode_key(&unknown.path)?;
                let version = self.from_db_timestamp(unknown.version)?;
                Ok(MaybeDocument::UnknownDocument(UnknownDocument::new(key, version)))
            }
        }
    }

    /// Decode a row for ordinary reads: missing rows and sentinel deletes
    /// both come back as `None`
    pub fn maybe_decode_document(
        &self,
        remote_doc: Option<&DbRemoteDocument>,
    ) -> Result<Option<MaybeDocument>> {
        let Some(remote_doc) = remote_doc else {
            return Ok(None);
        };
        let doc = self.from_db_remote_document(remote_doc)?;
        if doc.is_sentinel_delete() {
            return Ok(None);
        }
        Ok(Some(doc))
    }

    /// Encode a document for storage at `read_time`
    pub fn to_db_remote_document(
        &self,
        maybe_doc: &MaybeDocument,
        read_time: SnapshotVersion,
    ) -> DbRemoteDocument {
        let db_read_time = Some(self.to_db_timestamp_key(read_time));
        let parent_path = maybe_doc.key().collection_path();
        match maybe_doc {
            MaybeDocument::Document(doc) => DbRemoteDocument {
                unknown_document: None,
                no_document: None,
                document: Some(doc.proto().clone()),
                has_committed_mutations: doc.has_committed_mutations(),
                read_time: db_read_time,
                parent_path,
            },
            MaybeDocument::NoDocument(doc) => DbRemoteDocument {
                unknown_document: None,
                no_document: Some(DbNoDocument {
                    path: doc.key().path().clone(),
                    read_time: self.to_db_timestamp(doc.version()),
                }),
                document: None,
                has_committed_mutations: doc.has_committed_mutations(),
                read_time: db_read_time,
                parent_path,
            },
            MaybeDocument::UnknownDocument(doc) => DbRemoteDocument {
                unknown_document: Some(DbUnknownDocument {
                    path: doc.key().path().clone(),
                    version: self.to_db_timestamp(doc.version()),
                }),
                no_document: None,
                document: None,
                has_committed_mutations: true,
                read_time: db_read_time,
                parent_path,
            },
        }
    }

    pub fn to_db_timestamp_key(&self, version: SnapshotVersion) -> DbTimestampKey {
        let timestamp = version.to_timestamp();
        DbTimestampKey {
            seconds: timestamp.seconds(),
            nanoseconds: timestamp.nanoseconds(),
        }
    }

    pub fn from_db_timestamp_key(&self, key: DbTimestampKey) -> Result<SnapshotVersion> {
        self.version_from_parts(key.seconds, key.nanoseconds)
    }

    fn to_db_timestamp(&self, version: SnapshotVersion) -> DbTimestamp {
        let timestamp = version.to_timestamp();
        DbTimestamp {
            seconds: timestamp.seconds(),
            nanoseconds: timestamp.nanoseconds(),
        }
    }

    fn from_db_timestamp(&self, timestamp: DbTimestamp) -> Result<SnapshotVersion> {
        self.version_from_parts(timestamp.seconds, timestamp.nanoseconds)
    }

    fn version_from_parts(&self, seconds: i64, nanoseconds: i32) -> Result<SnapshotVersion> {
        Timestamp::new(seconds, nanoseconds)
            .map(SnapshotVersion::from_timestamp)
            .map_err(|e| CacheError::Corruption(format!("stored timestamp is invalid: {}", e)))
    }

    fn decode_key(&self, path: &crate::model::ResourcePath) -> Result<DocumentKey> {
        DocumentKey::new(path.clone())
            .map_err(|e| CacheError::Corruption(format!("stored document path is invalid: {}", e)))
    }
}

/// Approximate size of a row: the canonical JSON length of its payload
///
/// The absolute value only approximates the storage footprint, but it is
/// computed the same way on every read and write so size deltas are exact.
pub fn db_document_size(remote_doc: &DbRemoteDocument) -> Result<usize> {
    let encoded = match remote_doc.payload()? {
        RemoteDocumentPayload::Document(doc) => serde_json::to_vec(doc),
        RemoteDocumentPayload::UnknownDocument(doc) => serde_json::to_vec(doc),
        RemoteDocumentPayload::NoDocument(doc) => serde_json::to_vec(doc),
    }
    .map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(encoded.len())
}
