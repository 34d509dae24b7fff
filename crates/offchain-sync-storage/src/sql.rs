//! Block-number conversions shared by the SQL backends.
//!
//! Both SQLite and Postgres store block numbers as signed 64-bit integers,
//! so a `u64` above `i64::MAX` has no column representation.

use offchain_sync_core::error::SyncError;

/// Convert a block number to its column value.
pub(crate) fn to_column(block: u64) -> Result<i64, SyncError> {
    i64::try_from(block).map_err(|_| {
        SyncError::Storage(format!(
            "block {block} exceeds the largest storable block number ({})",
            i64::MAX
        ))
    })
}

/// Convert a stored column value back to a block number.
pub(crate) fn from_column(value: i64) -> Result<u64, SyncError> {
    u64::try_from(value)
        .map_err(|_| SyncError::Storage(format!("stored block number {value} is negative")))
}
