//! Recall scoring against per-query ground-truth neighbor sets.

use std::collections::HashSet;

use crate::config::{INT_FILTER_MAX, KEYWORD_FULL_CORPUS};
use crate::dataset::QueryRecord;
use crate::document::Document;
use crate::filter::QueryFilter;

/// Fraction of the ground-truth top-`top_k` ids found in `results`.
///
/// Ground truth is keyed by the pass's filter pair; an unfiltered pass
/// reads the full-corpus key (the maximum int threshold and the
/// corpus-wide keyword token). Negative ids pad ground-truth lists whose
/// filter matches fewer than `top_k` documents and are skipped. Returns
/// `None` when the query carries no ground truth for the pair.
pub fn recall_score(
    results: &[Document],
    query: &QueryRecord,
    filter: &QueryFilter,
    top_k: u32,
) -> Option<f64> {
    let int_key = filter.int_lte.unwrap_or(INT_FILTER_MAX);
    let keyword_key = filter.keyword_all.as_deref().unwrap_or(KEYWORD_FULL_CORPUS);

    let expected: HashSet<u64> = query
        .recall
        .get(&int_key)?
        .get(keyword_key)?
        .iter()
        .filter(|id| id.is_positive())
        .map(|id| *id as u64)
        .take(top_k as usize)
        .collect();
    if expected.is_empty() {
        return None;
    }

    let found = results
        .iter()
        .filter_map(|doc| doc.id.parse::<u64>().ok())
        .filter(|id| expected.contains(id))
        .count();
    Some(found as f64 / expected.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            text: String::new(),
            int_filter: 0,
            keyword_filter: String::new(),
            dense_embedding: None,
        }
    }

    fn query_with_truth(int_key: u32, keyword_key: &str, ids: Vec<i64>) -> QueryRecord {
        QueryRecord {
            dense: vec![0.0],
            recall: HashMap::from([(int_key, HashMap::from([(keyword_key.to_string(), ids)]))]),
        }
    }

    #[test]
    fn full_overlap_scores_one() {
        let query = query_with_truth(100, "01000", vec![1, 2, 3]);
        let results = [doc("3"), doc("1"), doc("2")];
        let filter = QueryFilter::from_parts(Some(100), Some("01000"));
        assert_eq!(recall_score(&results, &query, &filter, 3), Some(1.0));
    }

    #[test]
    fn partial_overlap_scores_the_found_fraction() {
        let query = query_with_truth(100, "01000", vec![1, 2, 3, 4]);
        let results = [doc("1"), doc("9"), doc("4")];
        let filter = QueryFilter::from_parts(Some(100), Some("01000"));
        assert_eq!(recall_score(&results, &query, &filter, 4), Some(0.5));
    }

    #[test]
    fn unfiltered_pass_reads_the_full_corpus_key() {
        let query = query_with_truth(INT_FILTER_MAX, KEYWORD_FULL_CORPUS, vec![7]);
        let results = [doc("7")];
        assert_eq!(
            recall_score(&results, &query, &QueryFilter::none(), 1),
            Some(1.0)
        );
    }

    #[test]
    fn negative_padding_ids_are_skipped() {
        let query = query_with_truth(100, "01000", vec![5, -1, -1]);
        let results = [doc("5")];
        let filter = QueryFilter::from_parts(Some(100), Some("01000"));
        assert_eq!(recall_score(&results, &query, &filter, 3), Some(1.0));
    }

    #[test]
    fn missing_ground_truth_yields_no_score() {
        let query = query_with_truth(100, "01000", vec![1]);
        let other = QueryFilter::from_parts(Some(1_000), Some("01000"));
        assert_eq!(recall_score(&[doc("1")], &query, &other, 1), None);

        let bare = QueryRecord {
            dense: vec![0.0],
            recall: HashMap::new(),
        };
        assert_eq!(
            recall_score(&[doc("1")], &bare, &QueryFilter::none(), 1),
            None
        );
    }
}
