//! Model services consumed by ingestion and retrieval.
//!
//! Embedding and generation are opaque network services with unbounded
//! latency; the pipelines only see these traits. [`ollama`] provides the
//! HTTP implementations, [`mock`] the deterministic test doubles.

pub mod mock;
pub mod ollama;

use async_trait::async_trait;

use crate::types::RagError;

pub use mock::{MockEmbeddingProvider, MockGenerationProvider};
pub use ollama::{OllamaClient, OllamaEmbeddings, OllamaGenerator};

/// Turns text into fixed-dimension vectors, batch-first.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embeds a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::service("embedding", "provider returned no vectors"))
    }
}

/// Produces text from a prompt; expected to be near-deterministic at the
/// low sampling temperature this crate configures.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}
