//! Configuration for doccache
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Main configuration for a doccache persistence instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── remote_documents.snap   (store snapshot)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// How often committed transactions are written to the snapshot file
    pub snapshot_strategy: SnapshotStrategy,
}

/// Snapshot strategy: how often to persist the store to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStrategy {
    /// Snapshot after every read-write commit (safest, slowest)
    EveryCommit,

    /// Snapshot after N read-write commits
    EveryNCommits { count: usize },

    /// Only snapshot on explicit request or close
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./doccache_data"),
            snapshot_strategy: SnapshotStrategy::EveryNCommits { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings that can never work
    pub fn validate(&self) -> Result<()> {
        if let SnapshotStrategy::EveryNCommits { count: 0 } = self.snapshot_strategy {
            return Err(CacheError::Config(
                "snapshot strategy EveryNCommits requires count > 0".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(CacheError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the snapshot strategy
    pub fn snapshot_strategy(mut self, strategy: SnapshotStrategy) -> Self {
        self.config.snapshot_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
