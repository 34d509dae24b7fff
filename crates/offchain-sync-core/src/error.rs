//! Error types for the sync store.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reading or advancing sync progress.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
