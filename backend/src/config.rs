//! Scan engine settings loaded via OrthoConfig.
//!
//! Values come from `LOYALTY_*` environment variables, an optional config
//! file and command-line flags. Numeric settings carry attribute defaults so
//! an empty environment still loads.

use std::path::{Path, PathBuf};

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::idempotency::IdempotencyConfig;
use crate::domain::{AchievementBindings, AchievementBindingsError, ScanPolicy};
use crate::outbound::persistence::PoolConfig;

/// Registry compiled into the binary; used when no path is configured.
const BUNDLED_BINDINGS: &str = include_str!("../fixtures/achievement_bindings.json");

/// Configuration values for the scan engine and its PostgreSQL adapters.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "LOYALTY")]
pub struct ScanSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Upper bound on pooled connections.
    #[ortho_config(default = 10)]
    pub pool_max_size: u32,
    /// Attempts per scan before a write conflict is reported.
    #[ortho_config(default = 3)]
    pub max_scan_attempts: u32,
    /// Hours a scan receipt stays eligible for replay.
    #[ortho_config(default = 24)]
    pub idempotency_ttl_hours: u64,
    /// Optional path of an achievement binding registry.
    pub achievement_bindings_path: Option<PathBuf>,
}

impl ScanSettings {
    /// Return the database URL, if configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    /// Build a pool configuration for the given database URL.
    pub fn pool_config(&self, database_url: &str) -> PoolConfig {
        PoolConfig::new(database_url).with_max_size(self.pool_max_size)
    }

    /// Retry and replay policy for scans.
    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy::new(
            self.max_scan_attempts,
            IdempotencyConfig::with_ttl_hours(self.idempotency_ttl_hours),
        )
    }

    /// Return the registry override path, if one is configured.
    pub fn achievement_bindings_path(&self) -> Option<&Path> {
        self.achievement_bindings_path.as_deref()
    }

    /// Load and validate the achievement binding registry.
    ///
    /// Reads the configured file when set; otherwise parses the registry
    /// compiled into the binary.
    pub fn load_achievement_bindings(&self) -> Result<AchievementBindings, AchievementBindingsError> {
        match self.achievement_bindings_path() {
            Some(path) => AchievementBindings::from_file(path),
            None => AchievementBindings::from_json(BUNDLED_BINDINGS),
        }
    }
}
