//! Dataset sources for benchmark passes.
//!
//! Object-storage fetching and columnar decoding are external collaborators;
//! the passes consume documents through the narrow [`DocumentStream`] trait
//! and query vectors as a plain slice of [`QueryRecord`]s. Two sources are
//! provided: a deterministic seeded synthetic generator, and a JSON-lines
//! loader for pre-fetched query files.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::config::INT_FILTER_MAX;
use crate::document::Document;
use crate::error::DatasetError;

/// A batched, forward-only source of documents for ingest and write passes.
///
/// Implementations are driven from a blocking producer task, so `next_batch`
/// is synchronous; backpressure comes from the bounded channel the producer
/// feeds.
pub trait DocumentStream: Send {
    /// Returns up to `batch_size` documents, or `None` when exhausted.
    fn next_batch(&mut self, batch_size: usize) -> Option<Vec<Document>>;
}

/// One query vector, optionally loaded from a JSON-lines file.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRecord {
    /// Dense query vector; must match the collection's embedding dimension.
    pub dense: Vec<f32>,
    /// Ground-truth neighbor ids ranked best-first, keyed by
    /// `int_filter` threshold and then `keyword_filter` value. Empty for
    /// synthetic query sets, which carry no ground truth.
    #[serde(default)]
    pub recall: HashMap<u32, HashMap<String, Vec<i64>>>,
}

/// Deterministic synthetic document source.
///
/// Ids are sequential integers starting at 0. `int_filter` is uniform over
/// `[0, INT_FILTER_MAX]`. `keyword_filter` carries the selectivity bucket
/// tokens: "10000" on every document, "01000" on every 10th, "00100" on
/// every 100th, so keyword sweeps hit 100% / 10% / 1% of the corpus exactly.
/// Embeddings are unit-normalized vectors drawn from the seeded RNG.
pub struct SyntheticDocuments {
    next_id: u64,
    total: u64,
    dim: usize,
    rng: StdRng,
}

impl SyntheticDocuments {
    /// Creates a source of `total` documents with `dim`-dimensional
    /// embeddings. The same seed always produces the same corpus.
    pub fn new(total: u64, dim: usize, seed: u64) -> Self {
        Self {
            next_id: 0,
            total,
            dim,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn generate(&mut self) -> Document {
        let id = self.next_id;
        self.next_id += 1;

        let mut tokens = vec!["10000"];
        if id % 10 == 0 {
            tokens.push("01000");
        }
        if id % 100 == 0 {
            tokens.push("00100");
        }

        Document {
            id: id.to_string(),
            text: format!("synthetic document {id}"),
            int_filter: self.rng.gen_range(0..=INT_FILTER_MAX),
            keyword_filter: tokens.join(" "),
            dense_embedding: Some(unit_vector(&mut self.rng, self.dim)),
        }
    }
}

impl DocumentStream for SyntheticDocuments {
    fn next_batch(&mut self, batch_size: usize) -> Option<Vec<Document>> {
        if self.next_id >= self.total {
            return None;
        }
        let remaining = (self.total - self.next_id) as usize;
        let count = remaining.min(batch_size.max(1));
        Some((0..count).map(|_| self.generate()).collect())
    }
}

/// Generates a deterministic set of unit-normalized query vectors.
pub fn synthetic_queries(count: usize, dim: usize, seed: u64) -> Vec<QueryRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| QueryRecord {
            dense: unit_vector(&mut rng, dim),
            recall: HashMap::new(),
        })
        .collect()
}

/// Loads query vectors from a JSON-lines file, one record per line.
pub fn load_queries(path: impl AsRef<Path>) -> Result<Vec<QueryRecord>, DatasetError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    if records.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }
    Ok(records)
}

fn unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-8 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn synthetic_documents_are_deterministic() {
        let mut a = SyntheticDocuments::new(50, 8, 7);
        let mut b = SyntheticDocuments::new(50, 8, 7);
        let batch_a = a.next_batch(50).unwrap();
        let batch_b = b.next_batch(50).unwrap();
        for (x, y) in batch_a.iter().zip(&batch_b) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.int_filter, y.int_filter);
            assert_eq!(x.dense_embedding, y.dense_embedding);
        }
    }

    #[test]
    fn synthetic_stream_respects_total_and_batch_size() {
        let mut s = SyntheticDocuments::new(25, 4, 1);
        assert_eq!(s.next_batch(10).unwrap().len(), 10);
        assert_eq!(s.next_batch(10).unwrap().len(), 10);
        assert_eq!(s.next_batch(10).unwrap().len(), 5);
        assert!(s.next_batch(10).is_none());
    }

    #[test]
    fn keyword_buckets_match_selectivity() {
        let mut s = SyntheticDocuments::new(1_000, 4, 2);
        let docs = s.next_batch(1_000).unwrap();
        let with = |tok: &str| docs.iter().filter(|d| d.keyword_tokens().contains(tok)).count();
        assert_eq!(with("10000"), 1_000);
        assert_eq!(with("01000"), 100);
        assert_eq!(with("00100"), 10);
    }

    #[test]
    fn embeddings_are_unit_normalized() {
        let mut s = SyntheticDocuments::new(1, 16, 3);
        let doc = s.next_batch(1).unwrap().remove(0);
        let norm: f32 = doc
            .dense_embedding
            .unwrap()
            .iter()
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn load_queries_reads_json_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"dense": [0.1, 0.2], "recall": {{"10000": {{"10000": [4, 7, -1]}}}}}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"dense": [0.3, 0.4]}}"#).unwrap();

        let records = load_queries(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recall[&10_000]["10000"], vec![4, 7, -1]);
        assert_eq!(records[1].dense, vec![0.3, 0.4]);
        assert!(records[1].recall.is_empty());
    }

    #[test]
    fn load_queries_rejects_empty_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_queries(file.path()),
            Err(DatasetError::Empty(_))
        ));
    }
}
