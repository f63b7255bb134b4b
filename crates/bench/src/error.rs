//! Task-level and aggregate error types.
//!
//! A [`TaskError`] aborts exactly one task. The dispatcher collects them
//! into an [`AggregateFailure`] after every task has resolved, so a
//! multi-task invocation always reports how many of N tasks failed and
//! every underlying message; a single bad backend never hides the others.

use std::time::Duration;
use thiserror::Error;
use vexbench_core::error::BenchError;

/// Failure of one benchmark task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Bench(#[from] BenchError),

    /// The task exceeded its region executor's timeout ceiling and was
    /// killed. This is the only cancellation mechanism.
    #[error("task killed after exceeding the {}s executor timeout", .0.as_secs())]
    Timeout(Duration),

    /// The task panicked or its runtime handle was cancelled.
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl From<vexbench_core::error::ProviderError> for TaskError {
    fn from(err: vexbench_core::error::ProviderError) -> Self {
        TaskError::Bench(BenchError::Provider(err))
    }
}

impl From<vexbench_core::error::SinkError> for TaskError {
    fn from(err: vexbench_core::error::SinkError) -> Self {
        TaskError::Bench(BenchError::Sink(err))
    }
}

/// One resolved task failure, labeled with the task's identity
/// (e.g. `ingest/qdrant/1m`).
#[derive(Debug)]
pub struct TaskFailure {
    pub label: String,
    pub message: String,
}

/// Raised by the dispatcher after all tasks resolve, iff at least one
/// failed. Carries the failure count and every underlying message.
#[derive(Debug)]
pub struct AggregateFailure {
    /// Number of tasks submitted.
    pub total: usize,
    /// The tasks that failed, in submission order.
    pub failures: Vec<TaskFailure>,
}

impl std::fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} tasks failed",
            self.failures.len(),
            self.total
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.label, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
