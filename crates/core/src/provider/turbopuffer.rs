//! Turbopuffer adapter over the namespace write/query API.
//!
//! Namespaces are created implicitly on first write, but the benchmark
//! needs the namespace to exist before warmup queries ping it, so `setup`
//! bootstraps missing namespaces by upserting and deleting a throwaway
//! document.
//!
//! Filter lowering is exact on both predicates: `["int_filter", "Lte", X]`
//! and `["keyword_filter", "ContainsAllTokens", K]`, conjoined under
//! `["And", [...]]`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EMBEDDING_DIM;
use crate::document::Document;
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{check_response, invalid, require_env, Provider};

const NAME: &str = "turbopuffer";

const ATTRIBUTES: [&str; 3] = ["text", "int_filter", "keyword_filter"];

pub struct TurbopufferProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TurbopufferProvider {
    /// Connects using `TURBOPUFFER_API_KEY` and `TURBOPUFFER_REGION`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let region = require_env("TURBOPUFFER_REGION")?;
        Ok(Self::new(
            format!("https://{region}.turbopuffer.com"),
            require_env("TURBOPUFFER_API_KEY")?,
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

    async fn write(&self, namespace: &str, body: Value) -> Result<(), ProviderError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/v2/namespaces/{namespace}"))
            .json(&body)
            .send()
            .await?;
        check_response(NAME, resp).await?;
        Ok(())
    }
}

/// Lowers the canonical predicates into Turbopuffer filter tuples.
fn filter_json(filter: &QueryFilter) -> Option<Value> {
    let mut clauses = Vec::new();
    if let Some(threshold) = filter.int_lte {
        clauses.push(json!(["int_filter", "Lte", threshold]));
    }
    if let Some(keyword) = &filter.keyword_all {
        clauses.push(json!(["keyword_filter", "ContainsAllTokens", keyword]));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(json!(["And", clauses]))
    }
}

fn row_to_document(row: &Value) -> Result<Document, ProviderError> {
    let id = row
        .get("id")
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| invalid(NAME, "row without id"))?;

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

fn upsert_row(doc: &Document) -> Value {
    json!({
        "id": doc.id,
        "vector": doc.embedding_or_empty(),
        "text": doc.text,
        "int_filter": doc.int_filter,
        "keyword_filter": doc.keyword_filter,
    })
}

#[async_trait]
impl Provider for TurbopufferProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        if self
            .list_collections()
            .await?
            .iter()
            .any(|ns| ns == collection)
        {
            return Ok(());
        }

        // Bootstrap the namespace so warmup queries have something to ping.
        let bootstrap = Document {
            id: "__bootstrap__".to_string(),
            text: "bootstrap".to_string(),
            int_filter: 1,
            keyword_filter: "bootstrap".to_string(),
            dense_embedding: Some(vec![0.1; EMBEDDING_DIM]),
        };
        self.upsert(collection, std::slice::from_ref(&bootstrap))
            .await?;
        self.delete_by_id(collection, &[bootstrap.id]).await
    }

    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/v2/namespaces/{collection}/query"),
            )
            .json(&json!({
                "rank_by": ["id", "asc"],
                "filters": ["id", "Eq", id],
                "top_k": 1,
                "include_attributes": ATTRIBUTES,
            }))
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        let rows = body
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "query response without rows"))?;
        rows.first().map(row_to_document).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        let mut body = json!({
            "rank_by": ["vector", "ANN", vector],
            "top_k": top_k,
            "include_attributes": ATTRIBUTES,
        });
        if let Some(f) = filter_json(filter) {
            body["filters"] = f;
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/v2/namespaces/{collection}/query"),
            )
            .json(&body)
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body.get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "query response without rows"))?
            .iter()
            .map(row_to_document)
            .collect()
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        self.write(
            collection,
            json!({
                "upsert_rows": docs.iter().map(upsert_row).collect::<Vec<_>>(),
                "distance_metric": "cosine_distance",
                "schema": {
                    "text": { "type": "string" },
                    "int_filter": { "type": "int" },
                    "keyword_filter": { "type": "string", "full_text_search": true },
                },
            }),
        )
        .await
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        self.write(collection, json!({ "deletes": ids })).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/v2/namespaces/{collection}"),
            )
            .send()
            .await?;
        check_response(NAME, resp).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .request(reqwest::Method::GET, "/v1/namespaces")
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body.get("namespaces")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "namespace list missing"))?
            .iter()
            .map(|ns| {
                ns.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| invalid(NAME, "namespace without id"))
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
    fn empty_filter_lowers_to_none() {
        assert!(filter_json(&QueryFilter::none()).is_none());
    }

    #[test]
    fn single_predicate_is_still_wrapped_in_and() {
        assert_eq!(
            filter_json(&QueryFilter::int_lte(7)).unwrap(),
            json!(["And", [["int_filter", "Lte", 7]]])
        );
    }

    #[test]
    fn keyword_predicate_uses_contains_all_tokens() {
        assert_eq!(
            filter_json(&QueryFilter::keyword_all("red blue")).unwrap(),
            json!(["And", [["keyword_filter", "ContainsAllTokens", "red blue"]]])
        );
    }

    #[test]
    fn combined_predicates_share_the_and() {
        let f = filter_json(&QueryFilter::from_parts(Some(1), Some("k"))).unwrap();
        assert_eq!(f[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn upsert_row_sends_empty_vector_for_absent_embedding() {
        let doc = Document {
            id: "1".to_string(),
            text: String::new(),
            int_filter: 0,
            keyword_filter: String::new(),
            dense_embedding: None,
        };
        assert_eq!(upsert_row(&doc)["vector"], json!([]));
    }
}
