//! offchain-sync-storage — pluggable storage backends for offchain-sync.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence, fault injection)
//! - `sqlite` — SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres` — PostgreSQL via `sqlx` (pooled, production)

pub mod memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{Fault, InMemoryStorage, Step};
