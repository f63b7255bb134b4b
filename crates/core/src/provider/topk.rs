//! TopK adapter over the collection query API.
//!
//! Schema mapping: `text` and `keyword_filter` as required text fields
//! (`keyword_filter` with a keyword index), `dense_embedding` as an
//! f32 vector with a cosine vector index, `int_filter` as a required int.
//! The canonical id maps to the reserved `_id` field.
//!
//! Filter lowering is exact on both predicates: the int predicate becomes
//! an `lte` field filter and the keyword predicate a `match_all` filter,
//! which requires every whitespace token to be present.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EMBEDDING_DIM;
use crate::document::Document;
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{check_response, env_or, invalid, require_env, Provider};

const NAME: &str = "topk";

pub struct TopkProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TopkProvider {
    /// Connects using `TOPK_API_KEY` and `TOPK_REGION`, with `TOPK_HOST`
    /// (default `topk.io`) for non-production deployments.
    pub fn from_env() -> Result<Self, ProviderError> {
        let region = require_env("TOPK_REGION")?;
        let host = env_or("TOPK_HOST", "topk.io");
        Ok(Self::new(
            format!("https://{region}.api.{host}/v1"),
            require_env("TOPK_API_KEY")?,
        ))
    }

    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
    }

    async fn run_query(&self, collection: &str, query: Value) -> Result<Vec<Document>, ProviderError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/query"),
            )
            .json(&query)
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body.get("docs")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "query response without docs"))?
            .iter()
            .map(to_document)
            .collect()
    }
}

/// Lowers the canonical predicates into TopK field filters.
fn filter_stages(filter: &QueryFilter) -> Vec<Value> {
    let mut stages = Vec::new();
    if let Some(threshold) = filter.int_lte {
        stages.push(json!({ "field": "int_filter", "op": "lte", "value": threshold }));
    }
    if let Some(keyword) = &filter.keyword_all {
        stages.push(json!({ "field": "keyword_filter", "op": "match_all", "value": keyword }));
    }
    stages
}

fn to_document(row: &Value) -> Result<Document, ProviderError> {
    let id = row
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(NAME, "doc without _id"))?
        .to_string();

    Ok(Document {
        id,
        text: row
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        int_filter: row
            .get("int_filter")
            .and_then(Value::as_u64)
            .unwrap_or_default() as u32,
        keyword_filter: row
            .get("keyword_filter")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        dense_embedding: None,
    })
}

#[async_trait]
impl Provider for TopkProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        let resp = self
            .request(reqwest::Method::POST, "/collections")
            .json(&json!({
                "name": collection,
                "schema": {
                    "text": { "type": "text", "required": true },
                    "dense_embedding": {
                        "type": "f32_vector",
                        "dimension": EMBEDDING_DIM,
                        "index": { "type": "vector", "metric": "cosine" },
                    },
                    "int_filter": { "type": "int", "required": true },
                    "keyword_filter": {
                        "type": "text",
                        "required": true,
                        "index": { "type": "keyword" },
                    },
                },
            }))
            .send()
            .await?;
        // Collection already exists; compatible schema by convention.
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        check_response(NAME, resp).await?;
        Ok(())
    }

    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError> {
        let docs = self
            .run_query(
                collection,
                json!({
                    "select": ["text", "int_filter", "keyword_filter"],
                    "filters": [{ "field": "_id", "op": "eq", "value": id }],
                    "limit": 1,
                }),
            )
            .await?;
        Ok(docs.into_iter().next())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        self.run_query(
            collection,
            json!({
                "select": ["text", "int_filter", "keyword_filter"],
                "rank": {
                    "vector_distance": { "field": "dense_embedding", "query": vector },
                },
                "filters": filter_stages(filter),
                "top_k": top_k,
            }),
        )
        .await
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        let rows: Vec<Value> = docs
            .iter()
            .map(|doc| {
                json!({
                    "_id": doc.id,
                    "text": doc.text,
                    "dense_embedding": doc.embedding_or_empty(),
                    "int_filter": doc.int_filter,
                    "keyword_filter": doc.keyword_filter,
                })
            })
            .collect();

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/documents"),
            )
            .json(&json!({ "documents": rows }))
            .send()
            .await?;
        check_response(NAME, resp).await?;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/collections/{collection}/documents"),
            )
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        check_response(NAME, resp).await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/collections/{collection}"),
            )
            .send()
            .await?;
        check_response(NAME, resp).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .request(reqwest::Method::GET, "/collections")
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body.get("collections")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "collection list missing"))?
            .iter()
            .map(|c| {
                c.get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| invalid(NAME, "collection without name"))
            })
            .collect()
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_lowers_to_no_stages() {
        assert!(filter_stages(&QueryFilter::none()).is_empty());
    }

    #[test]
    fn int_predicate_lowers_to_lte_stage() {
        let stages = filter_stages(&QueryFilter::int_lte(100));
        assert_eq!(
            stages,
            vec![json!({ "field": "int_filter", "op": "lte", "value": 100 })]
        );
    }

    #[test]
    fn keyword_predicate_lowers_to_match_all() {
        let stages = filter_stages(&QueryFilter::keyword_all("a b"));
        assert_eq!(
            stages,
            vec![json!({ "field": "keyword_filter", "op": "match_all", "value": "a b" })]
        );
    }

    #[test]
    fn to_document_maps_reserved_id_field() {
        let row = json!({
            "_id": "d9",
            "text": "t",
            "int_filter": 8,
            "keyword_filter": "a",
        });
        assert_eq!(to_document(&row).unwrap().id, "d9");
    }
}
