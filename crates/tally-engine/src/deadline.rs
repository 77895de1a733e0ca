//! # Deadline Executor
//!
//! Runs a remote operation and fails it if it does not complete within a
//! bound, WITHOUT cancelling the underlying operation.
//!
//! ## Timeout Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Deadline Executor Semantics                         │
//! │                                                                         │
//! │  execute(op, 10s)                                                       │
//! │       │                                                                 │
//! │       ├── op completes within 10s ──► caller gets op's Result          │
//! │       │                                                                 │
//! │       └── timer fires first ──► caller gets DeadlineExceeded           │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                        op KEEPS RUNNING as a detached task.            │
//! │                        It may still complete later and mutate          │
//! │                        remote state. Callers must tolerate             │
//! │                        eventual, unordered completion.                 │
//! │                                                                         │
//! │  On timeout the caller reports the error to the user but must NOT     │
//! │  roll back the optimistic local write - the operation may yet          │
//! │  succeed remotely, and the next snapshot will reconcile either way.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Deadline Executor
// =============================================================================

/// Executes remote operations under a deadline without cancelling them.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineExecutor {
    /// Deadline applied to every executed operation.
    deadline: Duration,
}

impl DeadlineExecutor {
    /// Creates an executor with the given deadline.
    pub fn new(deadline: Duration) -> Self {
        DeadlineExecutor { deadline }
    }

    /// Returns the configured deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Races `operation` against the deadline timer.
    ///
    /// The operation is spawned as its own task; timing out drops only the
    /// join handle, which detaches the task rather than aborting it. The
    /// operation continues to completion in the background.
    pub async fn execute<T, F>(&self, operation: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(operation);

        match timeout(self.deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                // The spawned task panicked; treat as an internal failure
                // rather than poisoning the caller.
                warn!(?join_err, "Remote operation task failed");
                Err(EngineError::Internal(format!(
                    "remote operation task failed: {join_err}"
                )))
            }
            Err(_elapsed) => {
                debug!(deadline = ?self.deadline, "Remote operation exceeded deadline");
                Err(EngineError::DeadlineExceeded(self.deadline.as_secs()))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_operation_returns_result() {
        let exec = DeadlineExecutor::new(Duration::from_secs(5));
        let result = exec.execute(async { Ok(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_operation_error_propagates() {
        let exec = DeadlineExecutor::new(Duration::from_secs(5));
        let result: EngineResult<()> = exec
            .execute(async { Err(EngineError::RemoteUnavailable("down".into())) })
            .await;
        assert!(matches!(result, Err(EngineError::RemoteUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let exec = DeadlineExecutor::new(Duration::from_secs(1));
        let result: EngineResult<()> = exec
            .execute(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::DeadlineExceeded(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_operation_keeps_running() {
        let exec = DeadlineExecutor::new(Duration::from_secs(1));
        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = completed.clone();

        let result: EngineResult<()> = exec
            .execute(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                completed_clone.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::DeadlineExceeded(_))));
        assert!(!completed.load(Ordering::SeqCst));

        // The detached task completes after the caller has already
        // received its timeout.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(completed.load(Ordering::SeqCst));
    }
}
