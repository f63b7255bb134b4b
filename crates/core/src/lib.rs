//! # vexbench-core
//!
//! Core library of the vexbench multi-backend vector-search benchmark
//! harness: the canonical document and filter model, the provider contract
//! with one adapter per backend, the benchmark pass runners, dataset
//! sources, and telemetry. Task orchestration and the CLI live in the
//! `vexbench` binary crate.

/// Benchmark pass runners: ingest, query, read/write, and cleanup.
pub mod bench;
/// Global configuration constants: sizes, sweep tables, and tuning parameters.
pub mod config;
/// Dataset sources: document streams and query sets.
pub mod dataset;
/// Canonical document model shared by all backends.
pub mod document;
/// Error types for providers, datasets, sinks, and passes.
pub mod error;
/// Canonical query predicate semantics.
pub mod filter;
/// The provider capability contract and its backend adapters.
pub mod provider;
/// Metric recording, statistics, and artifact persistence.
pub mod telemetry;
