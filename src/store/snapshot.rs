//! Snapshot file format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "RDCS" (4) | Version: u16 (2) | PayloadLen: u64 │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                        │
//! │   metadata row + every (path, DbRemoteDocument) row      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                         │
//! │   PayloadCRC: u32                                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Written to `<path>.tmp` and renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{DbRemoteDocument, DbRemoteDocumentGlobal};
use crate::error::{CacheError, Result};
use crate::model::ResourcePath;

/// Magic bytes identifying a doccache snapshot file
pub(crate) const MAGIC: &[u8; 4] = b"RDCS";

/// Current snapshot format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Footer size: PayloadCRC (4)
pub(crate) const FOOTER_SIZE: usize = 4;

/// Borrowed payload for writing
#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub metadata: Option<DbRemoteDocumentGlobal>,
    pub documents: Vec<(&'a ResourcePath, &'a DbRemoteDocument)>,
}

/// Owned payload for reading
#[derive(Deserialize)]
pub(crate) struct SnapshotData {
    pub metadata: Option<DbRemoteDocumentGlobal>,
    pub documents: Vec<(ResourcePath, DbRemoteDocument)>,
}

/// Write a snapshot; returns the file size
pub(crate) fn write_snapshot(path: &Path, data: &SnapshotRef<'_>) -> Result<u64> {
    let payload =
        bincode::serialize(data).map_err(|e| CacheError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&payload);

    let tmp_path = path.with_extension("tmp");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| {
        CacheError::Io(std::io::Error::new(
            e.error().kind(),
            format!("Failed to flush snapshot: {}", e),
        ))
    })?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    sync_parent_dir(path);

    Ok((HEADER_SIZE + payload.len() + FOOTER_SIZE) as u64)
}

/// Read and verify a snapshot
pub(crate) fn read_snapshot(path: &Path) -> Result<SnapshotData> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(CacheError::Corruption(format!(
            "Snapshot too short: {} bytes",
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(CacheError::Corruption(format!(
            "Invalid snapshot magic: expected RDCS, got {:?}",
            &bytes[0..4]
        )));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(CacheError::Corruption(format!(
            "Unsupported snapshot version: {}",
            version
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;

    if bytes.len() != HEADER_SIZE + payload_len + FOOTER_SIZE {
        return Err(CacheError::Corruption(format!(
            "Snapshot length mismatch: header says {} payload bytes, file has {}",
            payload_len,
            bytes.len()
        )));
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[HEADER_SIZE + payload_len..]);
    let expected_crc = u32::from_le_bytes(crc_bytes);
    let actual_crc = crc32fast::hash(payload);

    if expected_crc != actual_crc {
        return Err(CacheError::Corruption(format!(
            "Snapshot checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    // The checksum matched, so a payload that fails to decode was written
    // wrong or holds invalid values.
    bincode::deserialize(payload)
        .map_err(|e| CacheError::Corruption(format!("Undecodable snapshot payload: {}", e)))
}

/// Best effort: make the rename durable on filesystems that need it
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    let result = File::open(parent).and_then(|dir| dir.sync_all());
    if let Err(e) = result {
        tracing::debug!(
            "Could not sync snapshot directory {}: {}",
            parent.display(),
            e
        );
    }
}
