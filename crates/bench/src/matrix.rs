//! The size-by-provider task matrix.
//!
//! One task per (dataset size, provider spec) combination. Each provider
//! runs in a fixed region and carries the ingest shape tuned for its write
//! path: backends with slower ingest use smaller batches and a wider
//! writer fan-out.

use vexbench_core::config::SIZES;
use vexbench_core::provider::ProviderKind;

/// Execution region a provider's tasks are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Eu,
    Us,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Eu => "eu",
            Region::Us => "us",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's row of the matrix.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub region: Region,
    /// Documents per upsert request during ingest.
    pub batch_size: usize,
    /// Concurrent ingest writers.
    pub concurrency: usize,
}

const MATRIX: [ProviderSpec; 5] = [
    ProviderSpec {
        kind: ProviderKind::Topk,
        region: Region::Eu,
        batch_size: 2_000,
        concurrency: 8,
    },
    ProviderSpec {
        kind: ProviderKind::Milvus,
        region: Region::Eu,
        batch_size: 2_000,
        concurrency: 8,
    },
    ProviderSpec {
        kind: ProviderKind::Turbopuffer,
        region: Region::Eu,
        batch_size: 2_000,
        concurrency: 8,
    },
    ProviderSpec {
        kind: ProviderKind::Qdrant,
        region: Region::Eu,
        batch_size: 2_000,
        concurrency: 4,
    },
    ProviderSpec {
        kind: ProviderKind::Pinecone,
        region: Region::Us,
        batch_size: 500,
        concurrency: 12,
    },
];

/// The provider rows, optionally restricted to a single provider.
pub fn provider_specs(only: Option<ProviderKind>) -> Vec<ProviderSpec> {
    MATRIX
        .iter()
        .filter(|spec| only.map_or(true, |kind| spec.kind == kind))
        .copied()
        .collect()
}

/// The dataset sizes, optionally restricted to a single size. An unknown
/// size yields an empty matrix, which the caller rejects.
pub fn sizes(only: Option<&str>) -> Vec<&'static str> {
    SIZES
        .iter()
        .filter(|size| only.map_or(true, |s| **size == s))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_matrix_is_fifteen_tasks() {
        assert_eq!(sizes(None).len() * provider_specs(None).len(), 15);
    }

    #[test]
    fn single_provider_filter_keeps_its_row() {
        let specs = provider_specs(Some(ProviderKind::Pinecone));
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].region, Region::Us);
        assert_eq!((specs[0].batch_size, specs[0].concurrency), (500, 12));
    }

    #[test]
    fn only_pinecone_runs_in_us() {
        for spec in provider_specs(None) {
            let expected = if spec.kind == ProviderKind::Pinecone {
                Region::Us
            } else {
                Region::Eu
            };
            assert_eq!(spec.region, expected);
        }
    }

    #[test]
    fn unknown_size_yields_an_empty_matrix() {
        assert!(sizes(Some("5t")).is_empty());
        assert_eq!(sizes(Some("1m")), vec!["1m"]);
    }
}
