//! Configuration for the read model and the engines built on it.
//!
//! Every section has defaults, so an empty TOML document is a valid config:
//!
//! ```toml
//! [storage]
//! path = "/var/lib/orderlens"
//! sync_interval = 100
//!
//! [limits]
//! leaderboard_limit = 10
//! migrate_batch_max = 250
//! ```

use crate::error::{ReadModelError, Result};
use crate::journal::Journal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Storage configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the journal, manifest and migration state.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// fsync the journal every N writes (0 and 1 both mean every write).
    pub sync_interval: u64,

    /// Number of dashboard results kept in the query cache.
    pub query_cache_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./readmodel"),
            create_if_missing: true,
            sync_interval: Journal::DEFAULT_SYNC_INTERVAL,
            query_cache_size: 64,
        }
    }
}

/// Query, API and backfill limits.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Rows in the top and bottom product leaderboards.
    pub leaderboard_limit: usize,
    /// Rows in the category rollup.
    pub category_limit: usize,
    /// Range length used when a dashboard request carries no explicit dates.
    pub default_days: i64,
    pub default_batch_size: usize,
    pub seed_batch_max: usize,
    pub migrate_batch_max: usize,
    /// Per-order error messages kept in the migration state.
    pub max_retained_errors: usize,
    /// Demo orders are numbered from here; cleanup purges ids at or above it.
    pub dummy_order_id_offset: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            leaderboard_limit: 5,
            category_limit: 5,
            default_days: 30,
            default_batch_size: 50,
            seed_batch_max: 1000,
            migrate_batch_max: 500,
            max_retained_errors: 100,
            dummy_order_id_offset: 9_000_000,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub limits: Limits,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.seed_batch_max == 0 || limits.migrate_batch_max == 0 {
            return Err(ReadModelError::Config(
                "batch size maximums must be at least 1".into(),
            ));
        }
        if limits.default_batch_size == 0 {
            return Err(ReadModelError::Config(
                "default_batch_size must be at least 1".into(),
            ));
        }
        if limits.default_days < 0 {
            return Err(ReadModelError::Config(
                "default_days must not be negative".into(),
            ));
        }
        Ok(())
    }
}
