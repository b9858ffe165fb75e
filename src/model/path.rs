//! Resource paths and document keys
//!
//! Paths are ordered segment by segment; a path sorts before every path it
//! is a proper prefix of. This order is also the physical row order of the
//! remote document store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A slash-separated path of non-empty segments, e.g. `rooms/abc/messages`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// The root path (zero segments)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a path from segments, rejecting empty or slash-bearing segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.is_empty() || segment.contains('/') {
                return Err(CacheError::InvalidArgument(format!(
                    "Invalid path segment: {:?}",
                    segment
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Parse `rooms/abc` (leading and trailing slashes are ignored)
    pub fn from_string(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }
        Self::from_segments(trimmed.split('/'))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first_segment(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment (the root stays the root)
    pub fn pop_last(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Path with one more segment appended
    pub fn child(&self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        if segment.is_empty() || segment.contains('/') {
            return Err(CacheError::InvalidArgument(format!(
                "Invalid path segment: {:?}",
                segment
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// True if every segment of `self` starts `other` (a path prefixes itself)
    pub fn is_prefix_of(&self, other: &ResourcePath) -> bool {
        self.len() <= other.len() && other.segments[..self.len()] == self.segments[..]
    }

    /// True if `other` is exactly one segment deeper and starts with `self`
    pub fn is_immediate_parent_of(&self, other: &ResourcePath) -> bool {
        self.len() + 1 == other.len() && self.is_prefix_of(other)
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Identifies one document: a path with an even, non-zero segment count
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn new(path: ResourcePath) -> Result<Self> {
        if !Self::is_document_key(&path) {
            return Err(CacheError::InvalidArgument(format!(
                "Invalid document key {:?}: path must have an even number of segments",
                path.canonical_string()
            )));
        }
        Ok(Self { path })
    }

    /// Parse `rooms/abc` or `/rooms/abc`
    pub fn from_path_string(path: &str) -> Result<Self> {
        Self::new(ResourcePath::from_string(path)?)
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ResourcePath::from_segments(segments)?)
    }

    pub fn is_document_key(path: &ResourcePath) -> bool {
        !path.is_empty() && path.len() % 2 == 0
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The collection holding this document (`rooms` for `rooms/abc`)
    pub fn collection_path(&self) -> ResourcePath {
        self.path.pop_last()
    }

    /// Id of the collection holding this document
    pub fn collection_id(&self) -> &str {
        // A document key has at least two segments.
        &self.path.segments[self.path.len() - 2]
    }

    pub fn into_path(self) -> ResourcePath {
        self.path
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}
