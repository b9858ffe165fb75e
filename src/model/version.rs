//! Timestamps and snapshot versions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// A point in time with nanosecond precision
///
/// Deserialization goes through [`Timestamp::new`], so stored values obey the
/// same nanosecond range as constructed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimestamp")]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: i32,
}

/// Unchecked wire shape of a [`Timestamp`]
#[derive(Deserialize)]
struct RawTimestamp {
    seconds: i64,
    nanoseconds: i32,
}

impl TryFrom<RawTimestamp> for Timestamp {
    type Error = CacheError;

    fn try_from(raw: RawTimestamp) -> Result<Self> {
        Self::new(raw.seconds, raw.nanoseconds)
    }
}

impl Timestamp {
    pub fn new(seconds: i64, nanoseconds: i32) -> Result<Self> {
        if !(0..NANOS_PER_SECOND).contains(&nanoseconds) {
            return Err(CacheError::InvalidArgument(format!(
                "Timestamp nanoseconds out of range: {}",
                nanoseconds
            )));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    const fn from_parts(seconds: i64, nanoseconds: i32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> i32 {
        self.nanoseconds
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

/// Logical version of a document revision; also the read time of a record
///
/// Two values are reserved: [`SnapshotVersion::MIN`] means "unset", and
/// [`SnapshotVersion::for_deleted_doc`] marks a sentinel delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    timestamp: Timestamp,
}

impl SnapshotVersion {
    pub const MIN: SnapshotVersion = SnapshotVersion {
        timestamp: Timestamp::from_parts(0, 0),
    };

    const DELETED: SnapshotVersion = SnapshotVersion {
        timestamp: Timestamp::from_parts(0, 1),
    };

    pub fn from_timestamp(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    pub fn new(seconds: i64, nanoseconds: i32) -> Result<Self> {
        Ok(Self::from_timestamp(Timestamp::new(seconds, nanoseconds)?))
    }

    /// Version carried by sentinel deletes
    pub fn for_deleted_doc() -> Self {
        Self::DELETED
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }

    pub fn to_timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotVersion({})", self.timestamp)
    }
}
