//! SQLite storage backend for offchain-sync.
//!
//! Persists the checkpoint and off-chain entries to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use offchain_sync_core::SyncStore;
//! use offchain_sync_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SyncStore::new(SqliteStorage::open("./sync.db").await?);
//!
//! // In-memory (tests / ephemeral)
//! let store = SyncStore::new(SqliteStorage::in_memory().await?);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use offchain_sync_core::config::StorageConfig;
use offchain_sync_core::db::{StateTransaction, SyncStateDb};
use offchain_sync_core::error::SyncError;
use offchain_sync_core::types::{Hash, OffChainData};

use crate::sql;

/// SQLite-backed storage for the checkpoint and off-chain entries.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./sync.db"`) or a full
    /// SQLite URL (`"sqlite:./sync.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool is pinned to a single connection because every SQLite
    /// in-memory connection is its own database. All data is lost when the
    /// pool is dropped.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Build from config; only `StorageConfig::Sqlite` is accepted.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, SyncError> {
        match config {
            StorageConfig::Sqlite { path } => Self::open(path).await,
            other => Err(SyncError::Config(format!(
                "expected sqlite backend, got {}",
                other.backend()
            ))),
        }
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        // Singleton checkpoint row
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_checkpoint (
                id           INTEGER PRIMARY KEY CHECK (id = 1),
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS offchain_data (
                key       TEXT    PRIMARY KEY,
                value     BLOB    NOT NULL,
                stored_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(())
    }

    // ─── Inspection ─────────────────────────────────────────────────────────────

    /// Look up a stored entry by key.
    pub async fn get_offchain_data(&self, key: &Hash) -> Result<Option<Vec<u8>>, SyncError> {
        let row = sqlx::query("SELECT value FROM offchain_data WHERE key = ?")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    /// Total number of stored entries.
    pub async fn offchain_data_count(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM offchain_data")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// An open SQLite transaction. Dropping it without commit rolls it back.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StateTransaction for SqliteTransaction {
    async fn commit(self) -> Result<(), SyncError> {
        self.tx
            .commit()
            .await
            .map_err(|e| SyncError::Storage(format!("commit: {e}")))
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| SyncError::Storage(format!("rollback: {e}")))
    }
}

// ─── SyncStateDb impl ────────────────────────────────────────────────────────

#[async_trait]
impl SyncStateDb for SqliteStorage {
    type Tx = SqliteTransaction;

    async fn get_last_processed_block(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT block_number FROM sync_checkpoint WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        row.map_or(Ok(0), |r| sql::from_column(r.get("block_number")))
    }

    async fn begin_state_transaction(&self) -> Result<SqliteTransaction, SyncError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(format!("begin: {e}")))?;
        Ok(SqliteTransaction { tx })
    }

    async fn store_last_processed_block(
        &self,
        block: u64,
        tx: &mut SqliteTransaction,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO sync_checkpoint (id, block_number, updated_at)
             VALUES (1, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                block_number = MAX(sync_checkpoint.block_number, excluded.block_number),
                updated_at   = excluded.updated_at",
        )
        .bind(sql::to_column(block)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx.tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        debug!(block, "checkpoint staged");
        Ok(())
    }

    async fn store_offchain_data(
        &self,
        data: &[OffChainData],
        tx: &mut SqliteTransaction,
    ) -> Result<(), SyncError> {
        let now = chrono::Utc::now().timestamp();
        for entry in data {
            sqlx::query(
                "INSERT INTO offchain_data (key, value, stored_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(entry.key.to_string())
            .bind(&entry.value)
            .bind(now)
            .execute(&mut *tx.tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        }

        debug!(entries = data.len(), "off-chain data staged");
        Ok(())
    }

    async fn reset_last_processed_block(&self, ancestor: u64) -> Result<u64, SyncError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(format!("begin: {e}")))?;

        let current = sqlx::query("SELECT block_number FROM sync_checkpoint WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?
            .map_or(Ok(0), |r| sql::from_column(r.get("block_number")))?;

        if ancestor >= current {
            return Ok(0);
        }

        sqlx::query(
            "INSERT INTO sync_checkpoint (id, block_number, updated_at)
             VALUES (1, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                block_number = excluded.block_number,
                updated_at   = excluded.updated_at",
        )
        .bind(sql::to_column(ancestor)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Storage(format!("commit: {e}")))?;

        debug!(ancestor, current, "checkpoint reset");
        Ok(current - ancestor)
    }

    async fn exists(&self, key: &Hash) -> Result<bool, SyncError> {
        let row = sqlx::query("SELECT 1 FROM offchain_data WHERE key = ?")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(row.is_some())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
