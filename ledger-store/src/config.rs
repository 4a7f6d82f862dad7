//! Configuration for the ledger store

use std::env;
use std::path::PathBuf;

/// Configuration for the ledger store
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Directory for the local snapshot files; the per-user data directory
    /// is used when unset
    pub cache_dir: Option<PathBuf>,
    /// Run without remote replication
    pub offline: bool,
    /// Capacity of each remote change feed
    pub feed_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cache_dir: env::var("TRADELOG_CACHE_DIR").ok().map(PathBuf::from),
            offline: env::var("TRADELOG_OFFLINE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            feed_capacity: env::var("TRADELOG_FEED_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64),
        }
    }
}

impl LedgerConfig {
    /// Create a new configuration using environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create a new configuration with custom values
    pub fn new(cache_dir: Option<PathBuf>, offline: bool, feed_capacity: usize) -> Self {
        Self {
            cache_dir,
            offline,
            feed_capacity,
        }
    }
}
