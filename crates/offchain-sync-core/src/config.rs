//! Sync store configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::observability::LogConfig;

/// Which storage backend persists the checkpoint and the off-chain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process only; nothing survives a restart.
    Memory,
    /// Single-file SQLite database.
    Sqlite {
        /// File path (`"./sync.db"`) or full SQLite URL.
        path: String,
    },
    /// PostgreSQL via a connection pool.
    Postgres {
        /// `postgresql://[user[:password]@][host][:port][/dbname]`
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        #[serde(default = "default_min_connections")]
        min_connections: u32,
        #[serde(default = "default_connect_timeout_secs")]
        connect_timeout_secs: u64,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl StorageConfig {
    /// Backend name as used in the `backend` tag.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite { .. } => "sqlite",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Top-level configuration for a [`SyncStore`](crate::sync::SyncStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStoreConfig {
    /// Wall-clock budget for each storage operation, in milliseconds.
    #[serde(default = "default_db_timeout_ms")]
    pub db_timeout_ms: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_db_timeout_ms() -> u64 {
    2_000
}

impl Default for SyncStoreConfig {
    fn default() -> Self {
        Self {
            db_timeout_ms: default_db_timeout_ms(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl SyncStoreConfig {
    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.db_timeout_ms == 0 {
            return Err(SyncError::Config("db_timeout_ms must be greater than 0".into()));
        }
        match &self.storage {
            StorageConfig::Memory => {}
            StorageConfig::Sqlite { path } if path.is_empty() => {
                return Err(SyncError::Config("sqlite path must not be empty".into()));
            }
            StorageConfig::Sqlite { .. } => {}
            StorageConfig::Postgres {
                url,
                max_connections,
                min_connections,
                ..
            } => {
                if url.is_empty() {
                    return Err(SyncError::Config("postgres url must not be empty".into()));
                }
                if min_connections > max_connections {
                    return Err(SyncError::Config(format!(
                        "min_connections ({min_connections}) exceeds max_connections ({max_connections})"
                    )));
                }
            }
        }
        Ok(())
    }
}
