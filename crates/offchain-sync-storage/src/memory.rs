//! In-memory storage backend.
//!
//! Keeps the checkpoint and off-chain entries in RAM. Writes made under a
//! [`MemoryTransaction`] are staged and applied in one step on commit.
//!
//! Useful for tests and short-lived processes that don't need persistence.
//! [`InMemoryStorage::inject`] makes individual storage steps fail or stall,
//! which is how the atomicity guarantees of `SyncStore` are exercised.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use offchain_sync_core::config::StorageConfig;
use offchain_sync_core::db::{StateTransaction, SyncStateDb};
use offchain_sync_core::error::SyncError;
use offchain_sync_core::types::{Hash, OffChainData};

/// A storage step that can be scripted to misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ReadCheckpoint,
    Begin,
    StoreData,
    StoreCheckpoint,
    Commit,
    Rollback,
    Reset,
    Exists,
}

/// How a step misbehaves once injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// The step returns a storage error.
    Fail(Step),
    /// The step never completes (until the caller's deadline drops it).
    Stall(Step),
}

const STALL: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct MemoryState {
    checkpoint: Option<u64>,
    data: HashMap<Hash, Vec<u8>>,
    faults: HashSet<Fault>,
    commits: u64,
    rollbacks: u64,
}

fn lock(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>, SyncError> {
    state
        .lock()
        .map_err(|e| SyncError::Storage(format!("lock poisoned: {e}")))
}

/// Check the fault table for `step`, stalling or failing as scripted.
async fn apply_faults(state: &Mutex<MemoryState>, step: Step) -> Result<(), SyncError> {
    let (fail, stall) = {
        let s = lock(state)?;
        (
            s.faults.contains(&Fault::Fail(step)),
            s.faults.contains(&Fault::Stall(step)),
        )
    };
    if stall {
        tokio::time::sleep(STALL).await;
    }
    if fail {
        return Err(SyncError::Storage(format!("injected failure at {step:?}")));
    }
    Ok(())
}

/// In-memory sync storage.
///
/// Cloning shares the underlying state. All data is lost when the last
/// clone is dropped.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config; only `StorageConfig::Memory` is accepted.
    pub fn from_config(config: &StorageConfig) -> Result<Self, SyncError> {
        match config {
            StorageConfig::Memory => Ok(Self::new()),
            other => Err(SyncError::Config(format!(
                "expected memory backend, got {}",
                other.backend()
            ))),
        }
    }

    /// Script a fault. It stays active until [`clear_faults`](Self::clear_faults).
    pub fn inject(&self, fault: Fault) -> Result<(), SyncError> {
        lock(&self.state)?.faults.insert(fault);
        Ok(())
    }

    pub fn clear_faults(&self) -> Result<(), SyncError> {
        lock(&self.state)?.faults.clear();
        Ok(())
    }

    /// Look up a stored entry by key.
    pub fn get_offchain_data(&self, key: &Hash) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(lock(&self.state)?.data.get(key).cloned())
    }

    /// Total number of stored entries.
    pub fn offchain_data_count(&self) -> Result<usize, SyncError> {
        Ok(lock(&self.state)?.data.len())
    }

    /// Number of committed and rolled-back transactions so far.
    pub fn transaction_counts(&self) -> Result<(u64, u64), SyncError> {
        let s = lock(&self.state)?;
        Ok((s.commits, s.rollbacks))
    }
}

/// Staged writes for one [`InMemoryStorage`] transaction.
pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    checkpoint: Option<u64>,
    data: Vec<OffChainData>,
}

#[async_trait]
impl StateTransaction for MemoryTransaction {
    async fn commit(self) -> Result<(), SyncError> {
        apply_faults(&self.state, Step::Commit).await?;

        let mut s = lock(&self.state)?;
        if let Some(block) = self.checkpoint {
            let current = s.checkpoint.unwrap_or(0);
            s.checkpoint = Some(current.max(block));
        }
        for entry in self.data {
            s.data.entry(entry.key).or_insert(entry.value);
        }
        s.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<(), SyncError> {
        {
            let mut s = lock(&self.state)?;
            s.rollbacks += 1;
        }
        apply_faults(&self.state, Step::Rollback).await
    }
}

#[async_trait]
impl SyncStateDb for InMemoryStorage {
    type Tx = MemoryTransaction;

    async fn get_last_processed_block(&self) -> Result<u64, SyncError> {
        apply_faults(&self.state, Step::ReadCheckpoint).await?;
        Ok(lock(&self.state)?.checkpoint.unwrap_or(0))
    }

    async fn begin_state_transaction(&self) -> Result<MemoryTransaction, SyncError> {
        apply_faults(&self.state, Step::Begin).await?;
        Ok(MemoryTransaction {
            state: self.state.clone(),
            checkpoint: None,
            data: Vec::new(),
        })
    }

    async fn store_last_processed_block(
        &self,
        block: u64,
        tx: &mut MemoryTransaction,
    ) -> Result<(), SyncError> {
        apply_faults(&self.state, Step::StoreCheckpoint).await?;
        tx.checkpoint = Some(block);
        Ok(())
    }

    async fn store_offchain_data(
        &self,
        data: &[OffChainData],
        tx: &mut MemoryTransaction,
    ) -> Result<(), SyncError> {
        apply_faults(&self.state, Step::StoreData).await?;
        tx.data.extend_from_slice(data);
        Ok(())
    }

    async fn reset_last_processed_block(&self, ancestor: u64) -> Result<u64, SyncError> {
        apply_faults(&self.state, Step::Reset).await?;

        let mut s = lock(&self.state)?;
        let current = s.checkpoint.unwrap_or(0);
        if ancestor >= current {
            return Ok(0);
        }
        s.checkpoint = Some(ancestor);
        Ok(current - ancestor)
    }

    async fn exists(&self, key: &Hash) -> Result<bool, SyncError> {
        apply_faults(&self.state, Step::Exists).await?;
        Ok(lock(&self.state)?.data.contains_key(key))
    }
}
