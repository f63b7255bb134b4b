//! Canonical document model shared by all backends.
//!
//! A [`Document`] is the one record shape every adapter translates into its
//! backend's native schema. `keyword_filter` is logically a set of
//! whitespace-separated tokens: backends that store it as a list must
//! preserve token-set equality (order may change) when converted back to the
//! space-joined string form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A canonical benchmark record.
///
/// `id` is the stable identity used for upsert/fetch/delete; re-upserting the
/// same `id` overwrites prior content. An absent `dense_embedding` is sent as
/// an empty vector where a backend requires a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned identity, stable across upserts.
    pub id: String,
    /// Text content.
    pub text: String,
    /// Scalar filter field, uniformly distributed over `[0, INT_FILTER_MAX]`.
    pub int_filter: u32,
    /// Whitespace-separated token set used by the keyword predicate.
    pub keyword_filter: String,
    /// Dense vector, only populated when upserting. Query results omit it.
    #[serde(default)]
    pub dense_embedding: Option<Vec<f32>>,
}

impl Document {
    /// The `keyword_filter` tokens as a set, for order-insensitive comparison.
    pub fn keyword_tokens(&self) -> BTreeSet<&str> {
        self.keyword_filter.split_whitespace().collect()
    }

    /// Approximate wire size of the document in bytes, used for ingest
    /// byte-throughput metrics.
    pub fn approx_size(&self) -> usize {
        self.id.len()
            + self.text.len()
            + std::mem::size_of::<u32>()
            + self.keyword_filter.len()
            + self
                .dense_embedding
                .as_ref()
                .map(|v| v.len() * std::mem::size_of::<f32>())
                .unwrap_or(0)
    }

    /// The embedding to send to a backend that requires a value: the dense
    /// vector if present, otherwise an empty vector.
    pub fn embedding_or_empty(&self) -> &[f32] {
        self.dense_embedding.as_deref().unwrap_or(&[])
    }
}

/// Joins a token list back into the canonical space-separated string form.
///
/// Used by adapters whose backend stores `keyword_filter` as a list.
pub fn join_tokens<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(keyword_filter: &str) -> Document {
        Document {
            id: "42".to_string(),
            text: "hello world".to_string(),
            int_filter: 7,
            keyword_filter: keyword_filter.to_string(),
            dense_embedding: Some(vec![0.1, 0.2, 0.3]),
        }
    }

    #[test]
    fn keyword_tokens_are_order_insensitive() {
        assert_eq!(doc("a b c").keyword_tokens(), doc("c a b").keyword_tokens());
        assert_ne!(doc("a b").keyword_tokens(), doc("a b c").keyword_tokens());
    }

    #[test]
    fn join_tokens_round_trips_token_set() {
        let original = doc("10000 01000 00100");
        let relisted: Vec<&str> = original.keyword_filter.split_whitespace().collect();
        let rejoined = doc(&join_tokens(relisted));
        assert_eq!(original.keyword_tokens(), rejoined.keyword_tokens());
    }

    #[test]
    fn approx_size_counts_embedding_bytes() {
        let with = doc("k");
        let without = Document {
            dense_embedding: None,
            ..with.clone()
        };
        assert_eq!(with.approx_size() - without.approx_size(), 3 * 4);
    }

    #[test]
    fn embedding_or_empty_handles_absence() {
        let mut d = doc("k");
        assert_eq!(d.embedding_or_empty().len(), 3);
        d.dense_embedding = None;
        assert!(d.embedding_or_empty().is_empty());
    }
}
