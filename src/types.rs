//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the crawl, ingestion, and retrieval pipelines.
///
/// The variants mirror how each failure is handled:
///
/// * [`Network`](RagError::Network) / [`Parse`](RagError::Parse) — per-URL
///   crawl failures; logged and skipped, never fatal to a crawl.
/// * [`IndexNotFound`](RagError::IndexNotFound) — retrieval was attempted
///   before any ingestion run created the vector index; raised before any
///   model service is called.
/// * [`Service`](RagError::Service) — an embedding/generation/reranking
///   call failed; propagated to the caller unmodified.
/// * [`Storage`](RagError::Storage) — page-store or vector-index write
///   failure; during ingestion this flips the pending batch to failed.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("vector index not found at {}; run ingestion first", .0.display())]
    IndexNotFound(PathBuf),

    #[error("{service} service error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("prompt template error: {0}")]
    Template(String),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Network(err.to_string())
    }
}

impl RagError {
    /// Shorthand for a service-boundary failure.
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        RagError::Service {
            service,
            message: message.into(),
        }
    }
}
