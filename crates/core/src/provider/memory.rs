//! In-process reference provider.
//!
//! Implements the canonical contract exactly: cosine-ranked ANN (by brute
//! force) and [`QueryFilter::matches`] for predicates. The test suite runs
//! the benchmark passes and the cleanup paths against it, and it doubles as
//! executable documentation of the semantics every remote adapter
//! approximates.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::document::Document;
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::Provider;

const NAME: &str = "memory";

type Collections = HashMap<String, HashMap<String, Document>>;

/// Instance-scoped in-memory backend; nothing is shared across instances.
#[derive(Default)]
pub struct MemoryProvider {
    collections: RwLock<Collections>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(collection: &str) -> ProviderError {
        ProviderError::Backend {
            provider: NAME,
            status: 404,
            message: format!("collection not found: {collection}"),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MIN;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        f32::MIN
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError> {
        let collections = self.collections.read();
        let docs = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;
        Ok(docs.get(id).cloned())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        let collections = self.collections.read();
        let docs = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;

        let mut scored: Vec<(f32, &Document)> = docs
            .values()
            .filter(|doc| filter.matches(doc))
            .filter_map(|doc| {
                doc.dense_embedding
                    .as_deref()
                    .map(|emb| (cosine(vector, emb), doc))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k as usize);

        Ok(scored.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        let mut collections = self.collections.write();
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing(collection))?;
        for doc in docs {
            store.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        let mut collections = self.collections.write();
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing(collection))?;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError> {
        self.collections.write().remove(collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DocumentStream, SyntheticDocuments};

    fn doc(id: &str, int_filter: u32, keywords: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            text: format!("doc {id}"),
            int_filter,
            keyword_filter: keywords.to_string(),
            dense_embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let p = MemoryProvider::new();
        p.setup("x-100k").await.unwrap();
        p.setup("x-100k").await.unwrap();
        assert_eq!(p.list_collections().await.unwrap(), vec!["x-100k"]);
    }

    #[tokio::test]
    async fn upsert_then_fetch_round_trips_token_set() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();

        let original = doc("7", 42, "b a", vec![1.0, 0.0]);
        p.upsert("c", &[original.clone()]).await.unwrap();

        let fetched = p.query_by_id("c", "7").await.unwrap().unwrap();
        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.text, original.text);
        assert_eq!(fetched.int_filter, original.int_filter);
        assert_eq!(fetched.keyword_tokens(), original.keyword_tokens());
    }

    #[tokio::test]
    async fn reupserting_an_id_overwrites() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();
        p.upsert("c", &[doc("1", 1, "old", vec![1.0])]).await.unwrap();
        p.upsert("c", &[doc("1", 2, "new", vec![1.0])]).await.unwrap();

        let fetched = p.query_by_id("c", "1").await.unwrap().unwrap();
        assert_eq!(fetched.int_filter, 2);
        assert_eq!(fetched.keyword_filter, "new");
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_and_truncates() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();
        p.upsert(
            "c",
            &[
                doc("far", 0, "k", vec![-1.0, 0.0]),
                doc("near", 0, "k", vec![1.0, 0.0]),
                doc("mid", 0, "k", vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        let hits = p
            .query("c", &[1.0, 0.0], 2, &QueryFilter::none())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "near");
        assert_eq!(hits[1].id, "mid");
    }

    #[tokio::test]
    async fn query_honors_canonical_filters() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();
        p.upsert(
            "c",
            &[
                doc("1", 50, "red blue", vec![1.0]),
                doc("2", 500, "red", vec![1.0]),
                doc("3", 5, "blue", vec![1.0]),
            ],
        )
        .await
        .unwrap();

        let hits = p
            .query("c", &[1.0], 10, &QueryFilter::int_lte(100))
            .await
            .unwrap();
        assert!(hits.iter().all(|d| d.int_filter <= 100));
        assert_eq!(hits.len(), 2);

        let hits = p
            .query("c", &[1.0], 10, &QueryFilter::keyword_all("red blue"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn int_filter_sweep_counts_are_monotonic() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();

        let mut source = SyntheticDocuments::new(2_000, 8, 11);
        while let Some(batch) = source.next_batch(500) {
            p.upsert("c", &batch).await.unwrap();
        }

        let mut counts = Vec::new();
        for threshold in [10_000, 1_000, 100] {
            let hits = p
                .query("c", &[1.0; 8], 2_000, &QueryFilter::int_lte(threshold))
                .await
                .unwrap();
            assert!(hits.iter().all(|d| d.int_filter <= threshold));
            counts.push(hits.len());
        }
        assert!(counts[0] >= counts[1] && counts[1] >= counts[2]);
    }

    #[tokio::test]
    async fn delete_by_id_removes_only_named_ids() {
        let p = MemoryProvider::new();
        p.setup("c").await.unwrap();
        p.upsert(
            "c",
            &[doc("1", 0, "", vec![1.0]), doc("2", 0, "", vec![1.0])],
        )
        .await
        .unwrap();

        p.delete_by_id("c", &["1".to_string()]).await.unwrap();
        assert!(p.query_by_id("c", "1").await.unwrap().is_none());
        assert!(p.query_by_id("c", "2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn operations_on_missing_collections_are_rejected() {
        let p = MemoryProvider::new();
        assert!(matches!(
            p.upsert("nope", &[]).await,
            Err(ProviderError::Backend { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let p = MemoryProvider::new();
        p.close().await.unwrap();
        p.close().await.unwrap();
    }
}
