//! Global configuration constants for vexbench.
//!
//! Benchmark tuning parameters, the canonical dataset sizes, and the fixed
//! sweep tables are defined here. Runtime configuration (provider/size
//! filters, output directory, timeouts) is handled via CLI arguments and
//! environment variables in the `vexbench` binary.

/// Dimensionality of `dense_embedding`, fixed for a collection's lifetime.
///
/// All five backends create their vector index at this dimension during
/// `setup`; documents with an absent embedding are sent as an empty vector
/// where the backend requires a value.
pub const EMBEDDING_DIM: usize = 768;

/// Prefix for benchmark collections; a collection is named `{prefix}-{size}`.
///
/// The name is stable across ingest and query phases so query benchmarks
/// operate on the collection ingest populated.
pub const COLLECTION_PREFIX: &str = "x";

/// Canonical dataset sizes, in ascending order.
pub const SIZES: [&str; 3] = ["100k", "1m", "10m"];

/// Number of results requested per query in every measured pass.
pub const DEFAULT_TOP_K: u32 = 10;

/// In-flight query counts for the QPS concurrency sweep, in pass order.
pub const QPS_CONCURRENCY_SWEEP: [usize; 4] = [1, 2, 4, 8];

/// Upper bound of the uniformly distributed `int_filter` field.
///
/// A threshold equal to this value matches the whole corpus (100%
/// selectivity); 1000 matches ~10%; 100 matches ~1%.
pub const INT_FILTER_MAX: u32 = 10_000;

/// Keyword token present on every document (100% selectivity).
pub const KEYWORD_FULL_CORPUS: &str = "10000";

/// The seven measured passes of the filter sweep, run strictly sequentially
/// at concurrency 1: unfiltered, then three integer selectivities
/// (100%, 10%, 1%), then three keyword selectivities (100%, 10%, 1%).
pub const FILTER_SWEEP: [(Option<u32>, Option<&str>); 7] = [
    (None, None),
    (Some(10_000), None),
    (Some(1_000), None),
    (Some(100), None),
    (None, Some("10000")),
    (None, Some("01000")),
    (None, Some("00100")),
];

/// Capacity of the bounded batch channel between the dataset producer and
/// the ingest writer pool.
pub const INGEST_CHANNEL_CAPACITY: usize = 100;

/// Batch size used by the read/write pass when re-upserting documents.
pub const RW_WRITE_BATCH: usize = 100;

/// Number of query vectors held in a synthetic query set.
pub const QUERY_SET_SIZE: usize = 1_000;

/// Default duration of one measured query pass, in seconds. Warmup passes
/// run with this doubled.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Per-region executor timeout ceiling (4 hours). The executor kills a task
/// that exceeds it; there is no other cancellation mechanism.
pub const EXECUTOR_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Document count for a canonical dataset size.
pub fn doc_count(size: &str) -> u64 {
    match size {
        "100k" => 100_000,
        "1m" => 1_000_000,
        "10m" => 10_000_000,
        other => panic!("unknown dataset size: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_counts_match_size_names() {
        assert_eq!(doc_count("100k"), 100_000);
        assert_eq!(doc_count("1m"), 1_000_000);
        assert_eq!(doc_count("10m"), 10_000_000);
    }

    #[test]
    fn filter_sweep_never_combines_predicates() {
        for (int_lte, keyword) in FILTER_SWEEP {
            assert!(int_lte.is_none() || keyword.is_none());
        }
    }
}
