//! Transaction discipline shared by every sync-store operation.
//!
//! Each public operation computes one [`Deadline`] when it starts and runs
//! every storage call against it. Calls that are still pending when the
//! deadline fires are dropped and reported as [`SyncError::Timeout`].
//!
//! A failed transaction is rolled back exactly once via [`rollback`]. The
//! rollback outcome is logged and never replaces the error that caused it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error};

use crate::db::StateTransaction;
use crate::error::SyncError;

/// Wall-clock budget for a single sync-store operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    budget: Duration,
    at: Instant,
}

impl Deadline {
    /// Start the clock for `operation`.
    pub fn start(operation: &'static str, budget: Duration) -> Self {
        Self {
            operation,
            budget,
            at: Instant::now() + budget,
        }
    }

    /// Await `fut`, failing with [`SyncError::Timeout`] if the deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    /// Like [`run`](Self::run) for futures that cannot fail.
    pub async fn wait<F, T>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| self.timeout_error())
    }

    fn timeout_error(&self) -> SyncError {
        SyncError::Timeout {
            operation: self.operation,
            after: self.budget,
        }
    }
}

/// Roll back `tx` after `cause` aborted it.
///
/// The rollback gets a fresh budget because the operation's own deadline may
/// already have expired. Failures are logged only.
pub async fn rollback<T: StateTransaction>(tx: T, cause: &SyncError, budget: Duration) {
    match tokio::time::timeout(budget, tx.rollback()).await {
        Ok(Ok(())) => debug!(cause = %cause, "transaction rolled back"),
        Ok(Err(e)) => error!(
            cause = %cause,
            error = %e,
            "failed to roll back transaction"
        ),
        Err(_) => error!(
            cause = %cause,
            budget = ?budget,
            "rollback timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    struct CountingTx {
        rollbacks: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl StateTransaction for CountingTx {
        async fn commit(self) -> Result<(), SyncError> {
            Ok(())
        }

        async fn rollback(self) -> Result<(), SyncError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SyncError::Storage("connection closed".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_inner_result_before_deadline() {
        let deadline = Deadline::start("read", Duration::from_secs(2));
        let v = deadline.run(async { Ok::<_, SyncError>(7u64) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn run_times_out_after_budget() {
        let deadline = Deadline::start("store", Duration::from_secs(2));
        let err = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, SyncError>(())
            })
            .await
            .unwrap_err();

        match err {
            SyncError::Timeout { operation, after } => {
                assert_eq!(operation, "store");
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        // An expired deadline fails any step that is not already complete.
        let err = deadline.wait(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_shared_across_steps() {
        let deadline = Deadline::start("store", Duration::from_secs(2));
        deadline
            .wait(tokio::time::sleep(Duration::from_millis(1500)))
            .await
            .unwrap();
        // 500ms left; a second 1s step must time out.
        let err = deadline
            .wait(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn rollback_failure_is_absorbed() {
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let tx = CountingTx {
            rollbacks: rollbacks.clone(),
            fail: true,
        };
        let cause = SyncError::Storage("insert failed".into());
        rollback(tx, &cause, Duration::from_secs(1)).await;
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }
}
