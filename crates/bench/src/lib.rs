//! # vexbench-bench
//!
//! Task matrix, region-scoped dispatch, and benchmark task bodies for the
//! `vexbench` binary. Tasks share no state; each constructs its own
//! provider, runs one workload protocol from `vexbench-core`, and persists
//! a metrics artifact. The dispatcher waits for every task and reports
//! partial failure as an aggregate error.

/// Task-level and aggregate error types.
pub mod error;
/// Region-bound task executor and the dispatcher.
pub mod executor;
/// The size-by-provider task matrix.
pub mod matrix;
/// Benchmark task bodies, one per workload mode.
pub mod tasks;
