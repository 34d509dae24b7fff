//! offchain-sync-core — reorg-safe checkpointing for off-chain data sync.
//!
//! # Architecture
//!
//! ```text
//! driver loop ──▶ SyncStore
//!                   ├── get/set/rewind start block (checkpoint cursor)
//!                   ├── store(block, entries)      (atomic batch writer)
//!                   ├── exists(key)                (dedup lookup)
//!                   └── Deadline + rollback        (transaction discipline)
//!                          │
//!                          ▼
//!                   SyncStateDb backend (memory / SQLite / Postgres)
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod sync;
pub mod txn;
pub mod types;

pub use config::{StorageConfig, SyncStoreConfig};
pub use db::{StateTransaction, SyncStateDb};
pub use error::SyncError;
pub use observability::{init_tracing, LogConfig};
pub use sync::{StartBlock, SyncStore, DEFAULT_DB_TIMEOUT};
pub use txn::Deadline;
pub use types::{Hash, OffChainData};
