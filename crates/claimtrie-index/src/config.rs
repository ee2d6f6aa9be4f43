//! Index configuration file.

use std::path::{Path, PathBuf};

use claimtrie_db::queries::claimtrie::ActivationDelay;
use claimtrie_db::search::ReaderConfig;
use serde::{Deserialize, Serialize};

use crate::{IndexError, Result};

/// Complete index configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Database location and cache.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Search and resolve tuning.
    #[serde(default)]
    pub reader: ReaderConfig,
    /// Consensus constants.
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Page cache per connection, in KiB.
    #[serde(default = "default_cache_size")]
    pub cache_size_kib: u32,
}

/// Expiration and activation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Claim lifetime before the extended-expiration fork.
    #[serde(default = "default_original_expiration")]
    pub original_expiration: u32,
    /// Claim lifetime from the fork height on.
    #[serde(default = "default_extended_expiration")]
    pub extended_expiration: u32,
    #[serde(default = "default_extended_expiration_fork")]
    pub extended_expiration_fork: u32,
    /// Upper bound on the activation delay, in blocks.
    #[serde(default = "default_max_activation_delay")]
    pub max_activation_delay: u32,
    /// One block of delay per this many blocks since the last takeover.
    #[serde(default = "default_activation_delay_factor")]
    pub activation_delay_factor: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("claims.db")
}

fn default_cache_size() -> u32 {
    claimtrie_db::DEFAULT_CACHE_SIZE_KIB
}

fn default_original_expiration() -> u32 {
    262_974
}

fn default_extended_expiration() -> u32 {
    2_102_400
}

fn default_extended_expiration_fork() -> u32 {
    137_181
}

fn default_max_activation_delay() -> u32 {
    4032
}

fn default_activation_delay_factor() -> u32 {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_size_kib: default_cache_size(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            original_expiration: default_original_expiration(),
            extended_expiration: default_extended_expiration(),
            extended_expiration_fork: default_extended_expiration_fork(),
            max_activation_delay: default_max_activation_delay(),
            activation_delay_factor: default_activation_delay_factor(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ChainConfig {
    /// Height at which a claim created or updated at `height` expires.
    pub fn expiration_height(&self, height: u32) -> u32 {
        if height >= self.extended_expiration_fork {
            height.saturating_add(self.extended_expiration)
        } else {
            height.saturating_add(self.original_expiration)
        }
    }

    pub fn activation_delay(&self) -> ActivationDelay {
        ActivationDelay {
            max_delay: self.max_activation_delay,
            factor: self.activation_delay_factor,
        }
    }
}

impl IndexConfig {
    /// Load from a TOML file, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| IndexError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| IndexError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.storage.db_path, PathBuf::from("claims.db"));
        assert_eq!(config.reader.query_timeout_ms, 250);
        assert_eq!(config.reader.max_limit, 50);
        assert_eq!(config.chain.max_activation_delay, 4032);
        assert_eq!(config.chain.activation_delay_factor, 32);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IndexConfig::from_toml_str(
            r#"
            [storage]
            db_path = "/var/lib/claims/index.db"

            [reader]
            query_timeout_ms = 1000
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage.db_path, PathBuf::from("/var/lib/claims/index.db"));
        assert_eq!(config.storage.cache_size_kib, claimtrie_db::DEFAULT_CACHE_SIZE_KIB);
        assert_eq!(config.reader.query_timeout_ms, 1000);
        assert_eq!(config.reader.pool_size, 4);
        assert_eq!(config.chain, ChainConfig::default());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = IndexConfig::default();
        config.chain.extended_expiration_fork = 10;
        config.logging.level = "debug".into();
        let text = config.to_toml_string().expect("serialize");
        let parsed = IndexConfig::from_toml_str(&text).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = IndexConfig::from_toml_str("[chain]\nmax_activation_delay = \"soon\"")
            .expect_err("type mismatch");
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IndexConfig::load(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_expiration_schedule() {
        let chain = ChainConfig::default();
        assert_eq!(chain.expiration_height(100), 100 + 262_974);
        assert_eq!(chain.expiration_height(137_180), 137_180 + 262_974);
        assert_eq!(chain.expiration_height(137_181), 137_181 + 2_102_400);
    }
}
