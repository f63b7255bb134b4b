//! Error types for providers, dataset sources, sinks, and benchmark passes.
//!
//! There is no retry at any layer: backend rejections are propagated
//! unmodified so that a failing pass aborts its task with the original
//! message intact. The only locally recovered condition is a setup racing
//! against an already-existing collection, which adapters swallow inside
//! [`crate::provider::Provider::setup`].

use thiserror::Error;

/// Error raised by a [`crate::provider::Provider`] operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required connection parameter was not found in the environment.
    ///
    /// Fatal for that provider's tasks only; sibling tasks keep running.
    #[error("missing connection parameter: {0}")]
    Config(String),

    /// The provider name given on the command line is not a known backend.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// HTTP transport failure (connect, timeout, body read).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request (schema mismatch, malformed payload,
    /// authentication failure). Carries the raw response body so the original
    /// detail survives propagation.
    #[error("{provider} rejected request (status {status}): {message}")]
    Backend {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// The backend answered 2xx but the body did not have the expected shape.
    #[error("unexpected {provider} response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
}

/// Error loading a document or query dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty dataset: {0}")]
    Empty(String),
}

/// Error persisting a metrics artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write metrics artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Error aborting a single benchmark pass.
///
/// A pass failure aborts the surrounding task but never rolls back partial
/// writes and never cancels sibling tasks.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A worker or producer task panicked or was cancelled.
    #[error("benchmark worker failed: {0}")]
    Worker(String),

    /// The pass was configured inconsistently (e.g. an empty query set).
    #[error("invalid pass configuration: {0}")]
    InvalidPass(String),
}

impl From<tokio::task::JoinError> for BenchError {
    fn from(err: tokio::task::JoinError) -> Self {
        BenchError::Worker(err.to_string())
    }
}
