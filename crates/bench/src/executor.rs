//! Region-bound task execution and the dispatcher.
//!
//! A [`RegionExecutor`] runs submitted tasks to completion under a hard
//! timeout ceiling; the ceiling is the only cancellation mechanism, there
//! is no mid-pass cancellation. The dispatcher submits every task without
//! blocking, awaits the handles in submission order, logs each failure
//! while continuing to wait on the rest, and raises one
//! [`AggregateFailure`] iff any task failed.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{AggregateFailure, TaskError, TaskFailure};
use crate::matrix::Region;
use vexbench_core::config::EXECUTOR_TIMEOUT_SECS;

/// Runs tasks bound to one execution region.
pub struct RegionExecutor {
    region: Region,
    timeout: Duration,
}

impl RegionExecutor {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            timeout: Duration::from_secs(EXECUTOR_TIMEOUT_SECS),
        }
    }

    /// An executor with a custom ceiling, for tests.
    pub fn with_timeout(region: Region, timeout: Duration) -> Self {
        Self { region, timeout }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Starts the task immediately and returns its handle without blocking.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> TaskHandle
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let label = label.into();
        let timeout = self.timeout;
        info!(region = %self.region, task = %label, "Task submitted");
        TaskHandle {
            label,
            timeout,
            inner: tokio::spawn(tokio::time::timeout(timeout, task)),
        }
    }
}

/// Handle to one running task; resolves to the task's result or a timeout.
pub struct TaskHandle {
    label: String,
    timeout: Duration,
    inner: JoinHandle<Result<Result<(), TaskError>, tokio::time::error::Elapsed>>,
}

impl TaskHandle {
    /// Blocks until the task resolves.
    pub async fn wait(self) -> (String, Result<(), TaskError>) {
        let result = match self.inner.await {
            Err(join) => Err(TaskError::Aborted(join.to_string())),
            Ok(Err(_)) => Err(TaskError::Timeout(self.timeout)),
            Ok(Ok(result)) => result,
        };
        (self.label, result)
    }
}

/// Awaits all handles in submission order, never cancelling siblings on a
/// failure, and reports partial failure as one aggregate error.
pub async fn dispatch(handles: Vec<TaskHandle>) -> Result<(), AggregateFailure> {
    let total = handles.len();
    let mut failures = Vec::new();

    for handle in handles {
        let (label, result) = handle.wait().await;
        match result {
            Ok(()) => info!(task = %label, "Task succeeded"),
            Err(err) => {
                error!(task = %label, error = %err, "Task failed");
                failures.push(TaskFailure {
                    label,
                    message: err.to_string(),
                });
            }
        }
    }

    if failures.is_empty() {
        info!(tasks = total, "All tasks succeeded");
        Ok(())
    } else {
        Err(AggregateFailure { total, failures })
    }
}
