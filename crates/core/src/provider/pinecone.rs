//! Pinecone adapter over the serverless REST API.
//!
//! Pinecone splits into a control plane (`api.pinecone.io`: create / list /
//! delete indexes) and a per-index data plane reached at the host the
//! control plane reports. The host lookup is cached per collection in an
//! instance-scoped map; no cache is shared across provider instances.
//!
//! Schema mapping: documents become vectors with `text`, `int_filter`, and
//! `keyword_filter` (as a token list) in metadata. Indexes are created with
//! the cosine metric.
//!
//! Filter lowering: the int predicate is an exact `$lte`. The keyword
//! predicate lowers to `$in` over the token-list metadata field, which is
//! membership of **any** listed token — a documented deviation from the
//! canonical all-tokens semantics.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::EMBEDDING_DIM;
use crate::document::{join_tokens, Document};
use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{check_response, env_or, invalid, require_env, Provider};

const NAME: &str = "pinecone";

const CONTROL_PLANE: &str = "https://api.pinecone.io";

pub struct PineconeProvider {
    client: reqwest::Client,
    api_key: String,
    cloud: String,
    region: String,
    /// Collection → data-plane host, filled lazily from the control plane.
    host_cache: Mutex<HashMap<String, String>>,
}

impl PineconeProvider {
    /// Connects using `PINECONE_API_KEY`, with `PINECONE_CLOUD` (default
    /// `aws`) and `PINECONE_REGION` (default `us-east-1`).
    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(
            require_env("PINECONE_API_KEY")?,
            env_or("PINECONE_CLOUD", "aws"),
            env_or("PINECONE_REGION", "us-east-1"),
        ))
    }

    pub fn new(api_key: String, cloud: String, region: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            cloud,
            region,
            host_cache: Mutex::new(HashMap::new()),
        }
    }

    fn control(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{CONTROL_PLANE}{path}"))
            .header("Api-Key", self.api_key.as_str())
    }

    /// Resolves (and caches) the data-plane host for a collection.
    async fn index_host(&self, collection: &str) -> Result<String, ProviderError> {
        if let Some(host) = self.host_cache.lock().get(collection) {
            return Ok(host.clone());
        }

        let resp = self
            .control(reqwest::Method::GET, &format!("/indexes/{collection}"))
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;
        let host = body
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(NAME, "index description without host"))?
            .to_string();

        self.host_cache
            .lock()
            .insert(collection.to_string(), host.clone());
        Ok(host)
    }

    async fn data(
        &self,
        collection: &str,
        path: &str,
        body: Value,
    ) -> Result<Value, ProviderError> {
        let host = self.index_host(collection).await?;
        let resp = self
            .client
            .post(format!("https://{host}{path}"))
            .header("Api-Key", self.api_key.as_str())
            .json(&body)
            .send()
            .await?;
        Ok(check_response(NAME, resp).await?.json().await?)
    }
}

/// Lowers the canonical predicates into a Pinecone metadata filter.
fn filter_json(filter: &QueryFilter) -> Option<Value> {
    let mut clauses = serde_json::Map::new();
    if let Some(threshold) = filter.int_lte {
        clauses.insert("int_filter".to_string(), json!({ "$lte": threshold }));
    }
    if filter.keyword_all.is_some() {
        // Match-any membership over the token list; see module docs.
        clauses.insert(
            "keyword_filter".to_string(),
            json!({ "$in": filter.keyword_tokens() }),
        );
    }
    if clauses.is_empty() {
        None
    } else {
        Some(Value::Object(clauses))
    }
}

fn to_document(entry: &Value) -> Result<Document, ProviderError> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(NAME, "match without id"))?
        .to_string();
    let metadata = entry.get("metadata").cloned().unwrap_or_else(|| json!({}));

    let keyword_filter = match metadata.get("keyword_filter") {
        Some(Value::Array(items)) => {
            join_tokens(items.iter().map(|v| v.as_str().unwrap_or_default()))
        }
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    Ok(Document {
        id,
        text: metadata
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        // Pinecone stores metadata numbers as floats.
        int_filter: metadata
            .get("int_filter")
            .and_then(Value::as_f64)
            .unwrap_or_default() as u32,
        keyword_filter,
        dense_embedding: None,
    })
}

#[async_trait]
impl Provider for PineconeProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&self, collection: &str) -> Result<(), ProviderError> {
        let resp = self
            .control(reqwest::Method::GET, &format!("/indexes/{collection}"))
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let resp = self
            .control(reqwest::Method::POST, "/indexes")
            .json(&json!({
                "name": collection,
                "dimension": EMBEDDING_DIM,
                "metric": "cosine",
                "spec": {
                    "serverless": { "cloud": self.cloud, "region": self.region },
                },
            }))
            .send()
            .await?;
        // Lost the creation race to a sibling task.
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
        let host = self.index_host(collection).await?;
        let resp = self
            .client
            .get(format!("https://{host}/vectors/fetch"))
            .header("Api-Key", self.api_key.as_str())
            .query(&[("ids", id)])
            .send()
            .await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        let vectors = body
            .get("vectors")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(NAME, "fetch response without vectors"))?;
        vectors.values().next().map(to_document).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(f) = filter_json(filter) {
            body["filter"] = f;
        }

        let body = self.data(collection, "/query", body).await?;
        body.get("matches")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "query response without matches"))?
            .iter()
            .map(to_document)
            .collect()
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError> {
        let vectors: Vec<Value> = docs
            .iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "values": doc.embedding_or_empty(),
                    "metadata": {
                        "text": doc.text,
                        "int_filter": doc.int_filter,
                        "keyword_filter": doc.keyword_filter.split_whitespace().collect::<Vec<_>>(),
                    },
                })
            })
            .collect();

        self.data(collection, "/vectors/upsert", json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError> {
        self.data(collection, "/vectors/delete", json!({ "ids": ids }))
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError> {
        let resp = self
            .control(reqwest::Method::DELETE, &format!("/indexes/{collection}"))
            .send()
            .await?;
        check_response(NAME, resp).await?;
        self.host_cache.lock().remove(collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self.control(reqwest::Method::GET, "/indexes").send().await?;
        let body: Value = check_response(NAME, resp).await?.json().await?;

        body.get("indexes")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(NAME, "index list missing"))?
            .iter()
            .map(|i| {
                i.get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| invalid(NAME, "index without name"))
            })
            .collect()
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
