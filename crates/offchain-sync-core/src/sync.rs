//! Sync store — the checkpoint cursor and atomic batch writer.
//!
//! The driver loop uses [`SyncStore`] to:
//! - find where to resume ([`get_start_block`](SyncStore::get_start_block)),
//! - persist a batch of off-chain data together with the block it was
//!   derived from ([`store`](SyncStore::store)),
//! - move the resume point back after a reorg
//!   ([`rewind_start_block`](SyncStore::rewind_start_block)),
//! - skip entries that are already stored ([`exists`](SyncStore::exists)).
//!
//! Every call runs under one [`Deadline`]. Mutating calls additionally hold a
//! single-writer guard so that an advance and a rewind never interleave.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SyncStoreConfig;
use crate::db::{StateTransaction, SyncStateDb};
use crate::error::SyncError;
use crate::txn::{self, Deadline};
use crate::types::{Hash, OffChainData};

/// Default wall-clock budget for each storage operation.
pub const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of [`SyncStore::get_start_block`].
///
/// A failed read still yields a usable block (`0`, i.e. genesis). The error
/// is kept so the caller can decide whether a full resync is acceptable.
#[derive(Debug)]
pub struct StartBlock {
    pub block: u64,
    pub error: Option<SyncError>,
}

impl StartBlock {
    /// Treat a failed read as fatal.
    pub fn into_result(self) -> Result<u64, SyncError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.block),
        }
    }
}

/// Checkpointed persistence for off-chain data keyed to blocks.
pub struct SyncStore<D: SyncStateDb> {
    db: D,
    timeout: Duration,
    writer: Mutex<()>,
}

impl<D: SyncStateDb> SyncStore<D> {
    pub fn new(db: D) -> Self {
        Self::with_timeout(db, DEFAULT_DB_TIMEOUT)
    }

    pub fn with_timeout(db: D, timeout: Duration) -> Self {
        Self {
            db,
            timeout,
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(db: D, config: &SyncStoreConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self::with_timeout(db, config.db_timeout()))
    }

    /// The underlying storage engine.
    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ─── Checkpoint cursor ────────────────────────────────────────────────────

    /// Block the driver should resume from.
    ///
    /// One block behind the stored checkpoint, since that block may have been
    /// only partially processed before a crash. `0` if nothing is stored or
    /// the read fails.
    pub async fn get_start_block(&self) -> StartBlock {
        let deadline = Deadline::start("get_start_block", self.timeout);

        match deadline.run(self.db.get_last_processed_block()).await {
            Ok(stored) => StartBlock {
                block: stored.saturating_sub(1),
                error: None,
            },
            Err(e) => {
                error!(error = %e, "error retrieving last processed block, starting from 0");
                StartBlock {
                    block: 0,
                    error: Some(e),
                }
            }
        }
    }

    /// Persist `block` as the last processed block in its own transaction.
    pub async fn set_start_block(&self, block: u64) -> Result<(), SyncError> {
        let deadline = Deadline::start("set_start_block", self.timeout);
        let _writer = deadline.wait(self.writer.lock()).await?;

        let mut tx = deadline.run(self.db.begin_state_transaction()).await?;

        if let Err(e) = deadline
            .run(self.db.store_last_processed_block(block, &mut tx))
            .await
        {
            txn::rollback(tx, &e, self.timeout).await;
            return Err(e);
        }

        deadline.run(tx.commit()).await?;
        debug!(block, "start block set");
        Ok(())
    }

    /// Reset the checkpoint to `lca`, the last block shared with the canonical chain.
    ///
    /// Stored off-chain data is kept; only the resume point moves.
    pub async fn rewind_start_block(&self, lca: u64) -> Result<(), SyncError> {
        let deadline = Deadline::start("rewind_start_block", self.timeout);
        let _writer = deadline.wait(self.writer.lock()).await?;

        let rewound = deadline
            .run(self.db.reset_last_processed_block(lca))
            .await?;
        if rewound > 0 {
            info!(rewound, lca, "rewound {rewound} blocks");
        }
        Ok(())
    }

    // ─── Atomic batch writer ──────────────────────────────────────────────────

    /// Store `data` and advance the checkpoint to `block` atomically.
    ///
    /// On error neither the entries nor the checkpoint change are visible.
    pub async fn store(&self, block: u64, data: &[OffChainData]) -> Result<(), SyncError> {
        let deadline = Deadline::start("store", self.timeout);
        let _writer = deadline.wait(self.writer.lock()).await?;

        let mut tx = deadline.run(self.db.begin_state_transaction()).await?;

        if let Err(e) = deadline
            .run(self.db.store_offchain_data(data, &mut tx))
            .await
        {
            txn::rollback(tx, &e, self.timeout).await;
            return Err(e);
        }

        if let Err(e) = deadline
            .run(self.db.store_last_processed_block(block, &mut tx))
            .await
        {
            txn::rollback(tx, &e, self.timeout).await;
            return Err(e);
        }

        deadline.run(tx.commit()).await?;
        debug!(block, entries = data.len(), "batch committed");
        Ok(())
    }

    // ─── Existence check ──────────────────────────────────────────────────────

    /// Whether an entry is stored under `key`, distinguishing lookup failure.
    pub async fn lookup(&self, key: &Hash) -> Result<bool, SyncError> {
        Deadline::start("exists", self.timeout)
            .run(self.db.exists(key))
            .await
    }

    /// Whether an entry is stored under `key`.
    ///
    /// Lookup failures resolve to `false`: the caller will store the entry
    /// again, which is a no-op for keys that already exist.
    pub async fn exists(&self, key: &Hash) -> bool {
        match self.lookup(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "existence check failed, treating key as absent");
                false
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
