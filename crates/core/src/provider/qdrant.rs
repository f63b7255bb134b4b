//! Qdrant adapter over the points REST API.
//!
//! Schema mapping: documents become points with a numeric id (Qdrant point
//! ids are integers or UUIDs, so the canonical string id must parse as
//! `u64`), the embedding as the point vector, and `text` / `int_filter` /
//! `keyword_filter` in the payload. `keyword_filter` is stored as a token
//! list and joined back to the space-separated form on read.
//!
//! Filter lowering: the int predicate is an exact `range { lte }`
//! condition. Qdrant's `match { value }` against a list payload field is
//! single-token membership, so the keyword predicate lowers to one `must`
//! condition per token — the conjunction restores all-tokens semantics.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::error;

use crate::config::EMBEDDING_DIM;
use crate::document::{join_tokens, Document};
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{check_response, invalid, require_env, Provider};

const NAME: &str = "qdrant";

pub struct QdrantProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl QdrantProvider {
    /// Connects using `QDRANT_URL` and `QDRANT_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(require_env("QDRANT_URL")?, require_env("QDRANT_API_KEY")?))
    }

    pub fn new(url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("api-key", self.api_key.as_str())
    }
}

/// Lowers the canonical predicates into a Qdrant `filter` body.
fn filter_json(filter: &QueryFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(threshold) = filter.int_lte {
        must.push(json!({
            "key": "int_filter",
            "range": { "lte": threshold },
        }));
    }
    for token in filter.keyword_tokens() {
        must.push(json!({
            "key": "keyword_filter",
            "match": { "value": token },
        }));
    }
    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn to_document(point: &Value) -> Result<Document, ProviderError> {
    let id = point
        .get("id")
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| invalid(NAME, "point without id"))?;
    let payload = point.get("payload").cloned().unwrap_or_else(|| json!({}));

    let keyword_filter = match payload.get("keyword_filter") {
        Some(Value::Array(items)) => {
            join_tokens(items.iter().map(|v| v.as_str().unwrap_or_default()))
        }
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    Ok(Document {
        id,
        text: payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        int_filter: payload
            .get("int_filter")
            .and_then(Value::as_u64)
            .unwrap_or_default() as u32,
        keyword_filter,
        dense_embedding: None,
    })
}

fn numeric_id(id: &str) -> Result<u64, ProviderError> {
    id.parse::<u64>()
        .map_err(|_| invalid(NAME, format!("non-numeric point id: {id}")))
}

#[async_trait]
impl Provider for QdrantProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        if self.list_collections().await?.iter().any(|c| c == collection) {
            return Ok(());
        }

        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{collection}"))
            .json(&json!({
                "vectors": { "size": EMBEDDING_DIM, "distance": "Cosine" },
            }))
            .send()
            .await?;
        // Another task may have created it between the list and the PUT.
        if resp.status() != reqwest::StatusCode::CONFLICT {
            check_response(NAME, resp).await?;
        }

        for (field, schema) in [("int_filter", "integer"), ("keyword_filter", "keyword")] {
            let resp = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/collections/{collection}/index"),
                )
                .json(&json!({ "field_name": field, "field_schema": schema }))
                .send()
                .await?;
            if resp.status() != reqwest::StatusCode::CONFLICT {
                check_response(NAME, resp).await?;
            }
        }

        Ok(())
    }

    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points"),
            )
            .json(&json!({ "ids": [numeric_id(id)?], "with_payload": true }))
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        let points = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "retrieve result is not an array"))?;
        points.first().map(to_document).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        let mut body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(f) = filter_json(filter) {
            body["filter"] = f;
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/query"),
            )
            .json(&body)
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body["result"]
            .get("points")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "query result without points"))?
            .iter()
            .map(to_document)
            .collect()
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        let points = docs
            .iter()
            .map(|doc| {
                Ok(json!({
                    "id": numeric_id(&doc.id)?,
                    "vector": doc.embedding_or_empty(),
                    "payload": {
                        "text": doc.text,
                        "int_filter": doc.int_filter,
                        "keyword_filter": doc.keyword_filter.split_whitespace().collect::<Vec<_>>(),
                    },
                }))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{collection}/points?wait=true"),
            )
            .json(&json!({ "points": points }))
            .send()
            .await?;

        // The raw body is logged here because the error detail is otherwise
        // lost once the error crosses the task boundary.
        if let Err(err) = check_response(NAME, resp).await {
            error!(%err, "qdrant rejected upsert");
            return Err(err);
        }
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        let ids = ids
            .iter()
            .map(|id| numeric_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/delete"),
            )
            .json(&json!({ "points": ids }))
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

        body["result"]
            .get("collections")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "collections list missing"))?
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
    fn empty_filter_lowers_to_none() {
        assert!(filter_json(&QueryFilter::none()).is_none());
    }

    #[test]
    fn int_predicate_lowers_to_range_lte() {
        let f = filter_json(&QueryFilter::int_lte(1_000)).unwrap();
        assert_eq!(
            f,
            json!({ "must": [{ "key": "int_filter", "range": { "lte": 1_000 } }] })
        );
    }

    #[test]
    fn keyword_predicate_lowers_to_one_must_per_token() {
        let f = filter_json(&QueryFilter::keyword_all("red blue")).unwrap();
        assert_eq!(
            f,
            json!({ "must": [
                { "key": "keyword_filter", "match": { "value": "red" } },
                { "key": "keyword_filter", "match": { "value": "blue" } },
            ]})
        );
    }

    #[test]
    fn combined_predicates_share_the_must_clause() {
        let f = filter_json(&QueryFilter::from_parts(Some(5), Some("x"))).unwrap();
        assert_eq!(f["must"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn to_document_joins_token_list() {
        let point = json!({
            "id": 7,
            "payload": {
                "text": "t",
                "int_filter": 42,
                "keyword_filter": ["a", "b"],
            },
        });
        let doc = to_document(&point).unwrap();
        assert_eq!(doc.id, "7");
        assert_eq!(doc.int_filter, 42);
        assert_eq!(doc.keyword_tokens(), ["a", "b"].into_iter().collect());
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        assert!(numeric_id("doc-1").is_err());
        assert_eq!(numeric_id("15").unwrap(), 15);
    }
}
