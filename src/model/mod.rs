//! Model Module
//!
//! In-memory document model shared by the codec, the cache and callers.
//!
//! ## Contents
//! - `ResourcePath` / `DocumentKey`: ordered paths
//! - `Timestamp` / `SnapshotVersion`: read times and document versions
//! - `Value` / `WireDocument`: the remote payload, stored opaquely
//! - `MaybeDocument`: the closed set of cached variants
//! - `Query`: single-collection predicate used by range scans

mod document;
mod path;
mod query;
mod value;
mod version;

pub use document::{Document, MaybeDocument, NoDocument, UnknownDocument, WireDocument};
pub use path::{DocumentKey, ResourcePath};
pub use query::{FieldFilter, Operator, Query};
pub use value::{ArrayValue, GeoPoint, MapValue, Value};
pub use version::{SnapshotVersion, Timestamp};
