//! Benchmark pass runners.
//!
//! A pass is one bounded unit of measured work against a single provider:
//! an ingest of a full document stream, a timed query loop at a fixed
//! concurrency, or a timed query loop with a concurrent writer. Passes
//! record into the [`Recorder`](crate::telemetry::Recorder) they are given
//! and abort on the first backend error; sequencing passes into protocols
//! (warmup, sweeps, artifact persistence) is the caller's concern.

use crate::config::COLLECTION_PREFIX;

pub mod cleanup;
pub mod ingest;
pub mod query;
pub mod recall;

pub use ingest::{run_ingest, IngestConfig};
pub use query::{run_query_pass, run_recall_pass, run_rw_pass, QueryPassConfig};
pub use recall::recall_score;

/// Workload mode of a benchmark task; names appear in artifact paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ingest,
    Qps,
    Filter,
    Rw,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ingest => "ingest",
            Mode::Qps => "qps",
            Mode::Filter => "filter",
            Mode::Rw => "rw",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection name for a dataset size, stable across ingest and query
/// phases so query benchmarks hit the collection ingest populated.
pub fn collection_name(size: &str) -> String {
    format!("{COLLECTION_PREFIX}-{size}")
}

/// Whether a collection was created by the benchmark harness. Cleanup only
/// ever touches collections this returns true for. Accepts `_` as well as
/// `-` because some backends reject dashes in identifiers and store the
/// sanitized form.
pub fn is_benchmark_collection(name: &str) -> bool {
    name.strip_prefix(COLLECTION_PREFIX)
        .and_then(|rest| rest.strip_prefix(['-', '_']))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_carry_the_prefix() {
        assert_eq!(collection_name("100k"), "x-100k");
        assert!(is_benchmark_collection("x-100k"));
        assert!(is_benchmark_collection("x-1m"));
        assert!(is_benchmark_collection("x_100k"));
        assert!(!is_benchmark_collection("production-data"));
        assert!(!is_benchmark_collection("x"));
    }

    #[test]
    fn mode_names_are_artifact_safe() {
        for mode in [Mode::Ingest, Mode::Qps, Mode::Filter, Mode::Rw] {
            assert!(mode.as_str().chars().all(|c| c.is_ascii_lowercase()));
        }
    }
}
