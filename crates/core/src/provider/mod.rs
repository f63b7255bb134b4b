//! The provider capability contract and its backend adapters.
//!
//! Five remote adapters translate the canonical document model and the
//! canonical predicates of [`crate::filter::QueryFilter`] into each
//! backend's HTTP API, plus one in-process reference provider
//! ([`memory::MemoryProvider`]) implementing the canonical semantics
//! exactly. Each provider instance owns one HTTP client and any
//! per-collection handle cache as instance-scoped state; nothing is shared
//! across instances.
//!
//! Error policy: backend errors are surfaced unmodified (no retry, no
//! suppression), except setup racing an already-existing collection, which
//! every adapter catches and treats as success.

use async_trait::async_trait;
use std::str::FromStr;

use crate::document::Document;
use crate::error::ProviderError;
use crate::filter::QueryFilter;

/// Milvus adapter (RESTful v2 API).
pub mod milvus;
/// Pinecone adapter (serverless control + data planes).
pub mod pinecone;
/// Qdrant adapter (points REST API).
pub mod qdrant;
/// TopK adapter (collection query DSL).
pub mod topk;
/// Turbopuffer adapter (namespace write/query API).
pub mod turbopuffer;

/// In-process reference provider with exact canonical semantics.
pub mod memory;

/// Capability contract implemented by every backend adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in metrics labels and artifact paths.
    fn name(&self) -> &'static str;

    /// Idempotently creates the collection, its schema, and its indexes.
    /// Must not fail when the collection already exists with a compatible
    /// schema.
    async fn setup(&self, collection: &str) -> Result<(), ProviderError>;

    /// Exact lookup by id; `None` when the document is not (yet) visible.
    async fn query_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ProviderError>;

    /// ANN search over `dense_embedding`, ranked by cosine similarity,
    /// truncated to `top_k`, with the filter's predicates ANDed in.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        filter: &QueryFilter,
    ) -> Result<Vec<Document>, ProviderError>;

    /// Batch insert-or-replace by id. Raises on backend rejection rather
    /// than silently dropping records.
    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<(), ProviderError>;

    /// Deletes the given ids; missing ids are not an error.
    async fn delete_by_id(&self, collection: &str, ids: &[String]) -> Result<(), ProviderError>;

    /// Destroys the collection and its data.
    async fn delete_collection(&self, collection: &str) -> Result<(), ProviderError>;

    /// Names of all collections currently visible to this provider's
    /// credentials.
    async fn list_collections(&self) -> Result<Vec<String>, ProviderError>;

    /// Releases the backend connection. Idempotent.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// The five remote backends, as selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Topk,
    Milvus,
    Turbopuffer,
    Qdrant,
    Pinecone,
}

impl ProviderKind {
    /// All kinds, in the task-matrix order.
    pub fn all() -> [ProviderKind; 5] {
        [
            ProviderKind::Topk,
            ProviderKind::Milvus,
            ProviderKind::Turbopuffer,
            ProviderKind::Qdrant,
            ProviderKind::Pinecone,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Topk => "topk",
            ProviderKind::Milvus => "milvus",
            ProviderKind::Turbopuffer => "turbopuffer",
            ProviderKind::Qdrant => "qdrant",
            ProviderKind::Pinecone => "pinecone",
        }
    }

    /// Constructs the adapter, resolving connection parameters from the
    /// environment. A missing parameter is a fatal error for this
    /// provider's tasks only.
    pub fn create(&self) -> Result<Box<dyn Provider>, ProviderError> {
        Ok(match self {
            ProviderKind::Topk => Box::new(topk::TopkProvider::from_env()?),
            ProviderKind::Milvus => Box::new(milvus::MilvusProvider::from_env()?),
            ProviderKind::Turbopuffer => {
                Box::new(turbopuffer::TurbopufferProvider::from_env()?)
            }
            ProviderKind::Qdrant => Box::new(qdrant::QdrantProvider::from_env()?),
            ProviderKind::Pinecone => Box::new(pinecone::PineconeProvider::from_env()?),
        })
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topk" => Ok(ProviderKind::Topk),
            "milvus" => Ok(ProviderKind::Milvus),
            "turbopuffer" => Ok(ProviderKind::Turbopuffer),
            "qdrant" => Ok(ProviderKind::Qdrant),
            "pinecone" => Ok(ProviderKind::Pinecone),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a required connection parameter from the environment.
pub(crate) fn require_env(key: &str) -> Result<String, ProviderError> {
    std::env::var(key).map_err(|_| ProviderError::Config(key.to_string()))
}

/// Resolves an optional connection parameter, with a default.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Turns a non-2xx response into a [`ProviderError::Backend`] carrying the
/// raw body, so the backend's original detail survives propagation.
pub(crate) async fn check_response(
    provider: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ProviderError::Backend {
        provider,
        status: status.as_u16(),
        message,
    })
}

/// Shorthand for "the backend answered but the body was not as expected".
pub(crate) fn invalid(provider: &'static str, message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider,
        message: message.into(),
    }
}
