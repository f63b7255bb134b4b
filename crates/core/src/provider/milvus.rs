//! Milvus adapter over the RESTful v2 API.
//!
//! Schema mapping: an explicit schema with `id` as a VarChar primary key,
//! `text` and `keyword_filter` as analyzed VarChars, `dense_embedding` as a
//! 768-dim FloatVector with an IVF_FLAT cosine index, and an INVERTED index
//! on `keyword_filter`. Collection names are sanitized (`-` → `_`) because
//! Milvus identifiers reject dashes.
//!
//! Filter lowering: predicates become a boolean expression string. The int
//! predicate is exact (`int_filter <= X`). The keyword predicate lowers to
//! `TEXT_MATCH(keyword_filter, '...')`, which matches documents containing
//! **any** of the analyzed tokens — a documented deviation from the
//! canonical all-tokens semantics.
//!
//! Milvus wraps failures in `{"code": N, "message": ...}` bodies with HTTP
//! 200, so responses are checked for a non-zero code as well.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EMBEDDING_DIM;
use crate::document::Document;
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{check_response, invalid, require_env, Provider};

const NAME: &str = "milvus";

const OUTPUT_FIELDS: [&str; 3] = ["text", "int_filter", "keyword_filter"];

pub struct MilvusProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl MilvusProvider {
    /// Connects using `MILVUS_URI` and `MILVUS_TOKEN`.
    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(require_env("MILVUS_URI")?, require_env("MILVUS_TOKEN")?))
    }

    pub fn new(uri: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: uri.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// POSTs to a `/v2/vectordb/...` endpoint and unwraps the `{code, data}`
    /// envelope, surfacing non-zero codes as backend rejections.
    async fn call(&self, path: &str, body: Value) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .post(format!("{}/v2/vectordb/{path}", self.base_url))
            .header("authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            return Err(ProviderError::Backend {
                provider: NAME,
                status: 200,
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown milvus error")
                    .to_string(),
            });
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Milvus identifiers reject dashes; `x-100k` becomes `x_100k`.
fn sanitize_collection(collection: &str) -> String {
    collection.replace('-', "_")
}

/// A `collections/create` rejection caused by the collection already
/// existing, e.g. when a sibling task creates it inside the window between
/// the existence check and the create call.
fn is_duplicate_collection(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Backend { message, .. }
            if message.contains("already exist") || message.contains("duplicate")
    )
}

/// Lowers the canonical predicates into a Milvus filter expression.
fn filter_expr(filter: &QueryFilter) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(threshold) = filter.int_lte {
        parts.push(format!("int_filter <= {threshold}"));
    }
    if let Some(keyword) = &filter.keyword_all {
        // Match-any over the analyzer's tokens; see module docs.
        parts.push(format!("TEXT_MATCH(keyword_filter, '{keyword}')"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" and "))
    }
}

fn to_document(row: &Value) -> Result<Document, ProviderError> {
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

#[async_trait]
impl Provider for MilvusProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        let name = sanitize_collection(collection);
        if self
            .list_collections()
            .await?
            .iter()
            .any(|c| c == &name)
        {
            return Ok(());
        }

        let created = self.call(
            "collections/create",
            json!({
                "collectionName": name,
                "schema": {
                    "enableDynamicField": false,
                    "fields": [
                        {
                            "fieldName": "id",
                            "dataType": "VarChar",
                            "isPrimary": true,
                            "elementTypeParams": { "max_length": 256 },
                        },
                        {
                            "fieldName": "text",
                            "dataType": "VarChar",
                            "elementTypeParams": {
                                "max_length": 4096,
                                "enable_analyzer": true,
                                "enable_match": true,
                            },
                        },
                        {
                            "fieldName": "dense_embedding",
                            "dataType": "FloatVector",
                            "elementTypeParams": { "dim": EMBEDDING_DIM },
                        },
                        {
                            "fieldName": "int_filter",
                            "dataType": "Int64",
                        },
                        {
                            "fieldName": "keyword_filter",
                            "dataType": "VarChar",
                            "elementTypeParams": {
                                "max_length": 256,
                                "enable_analyzer": true,
                                "enable_match": true,
                            },
                        },
                    ],
                },
                "indexParams": [
                    {
                        "fieldName": "dense_embedding",
                        "metricType": "COSINE",
                        "indexType": "IVF_FLAT",
                        "params": { "nlist": 1024 },
                    },
                    {
                        "fieldName": "keyword_filter",
                        "indexType": "INVERTED",
                    },
                ],
            }),
        )
        .await;
        match created {
            Ok(_) => {}
            // Lost a create race against a sibling task; the collection is
            // there, which is all setup guarantees.
            Err(err) if is_duplicate_collection(&err) => {}
            Err(err) => return Err(err),
        }

        self.call("collections/load", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError> {
        let data = self
            .call(
                "entities/query",
                json!({
                    "collectionName": sanitize_collection(collection),
                    "filter": format!("id == \"{id}\""),
                    "outputFields": OUTPUT_FIELDS,
                    "limit": 1,
                }),
            )
            .await?;
        let rows = data
            .as_array()
            .ok_or_else(|| invalid(NAME, "query data is not an array"))?;
        rows.first().map(to_document).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        let mut body = json!({
            "collectionName": sanitize_collection(collection),
            "data": [vector],
            "annsField": "dense_embedding",
            "limit": top_k,
            "outputFields": OUTPUT_FIELDS,
        });
        if let Some(expr) = filter_expr(filter) {
            body["filter"] = json!(expr);
        }

        let data = self.call("entities/search", body).await?;
        data.as_array()
            .ok_or_else(|| invalid(NAME, "search data is not an array"))?
            .iter()
            .map(to_document)
            .collect()
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        let rows: Vec<Value> = docs
            .iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "text": doc.text,
                    "dense_embedding": doc.embedding_or_empty(),
                    "int_filter": doc.int_filter,
                    "keyword_filter": doc.keyword_filter,
                })
            })
            .collect();

        self.call(
            "entities/upsert",
            json!({
                "collectionName": sanitize_collection(collection),
                "data": rows,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        let id_list = serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string());
        self.call(
            "entities/delete",
            json!({
                "collectionName": sanitize_collection(collection),
                "filter": format!("id in {id_list}"),
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError> {
        self.call(
            "collections/drop",
            json!({ "collectionName": sanitize_collection(collection) }),
        )
        .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let data = self.call("collections/list", json!({})).await?;
        data.as_array()
            .ok_or_else(|| invalid(NAME, "collections list is not an array"))?
            .iter()
            .map(|c| {
                c.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(NAME, "collection name is not a string"))
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
    fn collection_names_are_sanitized() {
        assert_eq!(sanitize_collection("x-100k"), "x_100k");
        assert_eq!(sanitize_collection("plain"), "plain");
    }

    #[test]
    fn duplicate_collection_rejections_are_recognized() {
        let dup = ProviderError::Backend {
            provider: NAME,
            status: 200,
            message: "collection x_100k already exists".to_string(),
        };
        assert!(is_duplicate_collection(&dup));

        let other = ProviderError::Backend {
            provider: NAME,
            status: 200,
            message: "rate limit exceeded".to_string(),
        };
        assert!(!is_duplicate_collection(&other));
        assert!(!is_duplicate_collection(&invalid(NAME, "bad body")));
    }

    #[test]
    fn empty_filter_lowers_to_none() {
        assert!(filter_expr(&QueryFilter::none()).is_none());
    }

    #[test]
    fn int_predicate_lowers_to_lte_expression() {
        assert_eq!(
            filter_expr(&QueryFilter::int_lte(100)).unwrap(),
            "int_filter <= 100"
        );
    }

    #[test]
    fn keyword_predicate_lowers_to_text_match() {
        assert_eq!(
            filter_expr(&QueryFilter::keyword_all("01000")).unwrap(),
            "TEXT_MATCH(keyword_filter, '01000')"
        );
    }

    #[test]
    fn combined_predicates_are_anded() {
        assert_eq!(
            filter_expr(&QueryFilter::from_parts(Some(10), Some("a"))).unwrap(),
            "int_filter <= 10 and TEXT_MATCH(keyword_filter, 'a')"
        );
    }

    #[test]
    fn to_document_reads_output_fields() {
        let row = json!({
            "id": "9",
            "text": "t",
            "int_filter": 3,
            "keyword_filter": "a b",
        });
        let doc = to_document(&row).unwrap();
        assert_eq!(doc.id, "9");
        assert_eq!(doc.int_filter, 3);
        assert_eq!(doc.keyword_filter, "a b");
    }
}
