//! Document variants
//!
//! A cached entry is exactly one of [`Document`], [`NoDocument`] or
//! [`UnknownDocument`]. "Not cached" is `None` at the API, never a variant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::path::DocumentKey;
use super::value::Value;
use super::version::{SnapshotVersion, Timestamp};
use crate::error::Result;

/// Server document payload as produced by the remote protocol layer
///
/// Stored verbatim; the cache only adds framing around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDocument {
    /// Document path, e.g. `rooms/abc`
    pub name: String,
    pub fields: BTreeMap<String, Value>,
    pub create_time: Timestamp,
    pub update_time: Timestamp,
}

/// A document known to exist, with its contents
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    key: DocumentKey,
    version: SnapshotVersion,
    proto: WireDocument,
    has_committed_mutations: bool,
}

impl Document {
    /// Build a document and a matching wire payload
    pub fn new(
        key: DocumentKey,
        version: SnapshotVersion,
        fields: BTreeMap<String, Value>,
        has_committed_mutations: bool,
    ) -> Self {
        let proto = WireDocument {
            name: key.to_string(),
            fields,
            create_time: version.to_timestamp(),
            update_time: version.to_timestamp(),
        };
        Self {
            key,
            version,
            proto,
            has_committed_mutations,
        }
    }

    /// Adopt a wire payload; key comes from `name`, version from `updateTime`
    pub fn from_wire(proto: WireDocument, has_committed_mutations: bool) -> Result<Self> {
        let key = DocumentKey::from_path_string(&proto.name)?;
        let version = SnapshotVersion::from_timestamp(proto.update_time);
        Ok(Self {
            key,
            version,
            proto,
            has_committed_mutations,
        })
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn has_committed_mutations(&self) -> bool {
        self.has_committed_mutations
    }

    pub fn proto(&self) -> &WireDocument {
        &self.proto
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.proto.fields
    }

    /// Look up a dotted field path such as `owner.name`
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.proto.fields.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::MapValue(map) => current = map.fields.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

/// A document known not to exist at `version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoDocument {
    key: DocumentKey,
    version: SnapshotVersion,
    has_committed_mutations: bool,
}

impl NoDocument {
    pub fn new(key: DocumentKey, version: SnapshotVersion, has_committed_mutations: bool) -> Self {
        Self {
            key,
            version,
            has_committed_mutations,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn has_committed_mutations(&self) -> bool {
        self.has_committed_mutations
    }

    /// True for the sentinel delete written when removals are tracked
    pub fn is_sentinel_delete(&self) -> bool {
        self.version == SnapshotVersion::for_deleted_doc()
    }
}

/// A document whose existence is known but whose contents are not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDocument {
    key: DocumentKey,
    version: SnapshotVersion,
}

impl UnknownDocument {
    pub fn new(key: DocumentKey, version: SnapshotVersion) -> Self {
        Self { key, version }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }
}

/// Any cached entry
#[derive(Debug, Clone, PartialEq)]
pub enum MaybeDocument {
    Document(Document),
    NoDocument(NoDocument),
    UnknownDocument(UnknownDocument),
}

impl MaybeDocument {
    pub fn key(&self) -> &DocumentKey {
        match self {
            MaybeDocument::Document(doc) => doc.key(),
            MaybeDocument::NoDocument(doc) => doc.key(),
            MaybeDocument::UnknownDocument(doc) => doc.key(),
        }
    }

    pub fn version(&self) -> SnapshotVersion {
        match self {
            MaybeDocument::Document(doc) => doc.version(),
            MaybeDocument::NoDocument(doc) => doc.version(),
            MaybeDocument::UnknownDocument(doc) => doc.version(),
        }
    }

    /// Unknown documents only arise from committed writes
    pub fn has_committed_mutations(&self) -> bool {
        match self {
            MaybeDocument::Document(doc) => doc.has_committed_mutations(),
            MaybeDocument::NoDocument(doc) => doc.has_committed_mutations(),
            MaybeDocument::UnknownDocument(_) => true,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            MaybeDocument::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn is_sentinel_delete(&self) -> bool {
        matches!(self, MaybeDocument::NoDocument(doc) if doc.is_sentinel_delete())
    }
}

impl From<Document> for MaybeDocument {
    fn from(doc: Document) -> Self {
        MaybeDocument::Document(doc)
    }
}

impl From<NoDocument> for MaybeDocument {
    fn from(doc: NoDocument) -> Self {
        MaybeDocument::NoDocument(doc)
    }
}

impl From<UnknownDocument> for MaybeDocument {
    fn from(doc: UnknownDocument) -> Self {
        MaybeDocument::UnknownDocument(doc)
    }
}
