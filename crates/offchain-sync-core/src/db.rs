//! Storage-engine seam consumed by the sync store.
//!
//! The sync store never talks to a database directly. It drives an
//! implementation of [`SyncStateDb`], which owns the connection pool and
//! knows how to persist the checkpoint and off-chain entries.
//!
//! Implementations live in `offchain-sync-storage` (`InMemoryStorage`,
//! `SqliteStorage`, `PostgresStorage`).

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::{Hash, OffChainData};

/// An open state transaction handed out by [`SyncStateDb::begin_state_transaction`].
///
/// Dropping a transaction without calling [`commit`](Self::commit) must
/// leave no writes visible.
#[async_trait]
pub trait StateTransaction: Send {
    /// Make every write performed under this transaction visible atomically.
    async fn commit(self) -> Result<(), SyncError>;

    /// Discard every write performed under this transaction.
    async fn rollback(self) -> Result<(), SyncError>;
}

/// Persistence operations for the checkpoint and the off-chain data set.
#[async_trait]
pub trait SyncStateDb: Send + Sync {
    type Tx: StateTransaction;

    /// Highest block whose data has been durably stored; `0` if none yet.
    async fn get_last_processed_block(&self) -> Result<u64, SyncError>;

    /// Open a transaction that groups subsequent writes.
    async fn begin_state_transaction(&self) -> Result<Self::Tx, SyncError>;

    /// Write the checkpoint under `tx`.
    async fn store_last_processed_block(
        &self,
        block: u64,
        tx: &mut Self::Tx,
    ) -> Result<(), SyncError>;

    /// Write `data` under `tx`. Keys that already exist are left untouched.
    async fn store_offchain_data(
        &self,
        data: &[OffChainData],
        tx: &mut Self::Tx,
    ) -> Result<(), SyncError>;

    /// Atomically reset the checkpoint to `ancestor`.
    ///
    /// Returns how many blocks the checkpoint moved back. An `ancestor` at or
    /// above the current checkpoint leaves it unchanged and returns `0`.
    async fn reset_last_processed_block(&self, ancestor: u64) -> Result<u64, SyncError>;

    /// Whether an entry is stored under `key`.
    async fn exists(&self, key: &Hash) -> Result<bool, SyncError>;
}
