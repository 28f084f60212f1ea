//! Precision pass over the retrieved candidate set.
//!
//! Reranking always scores against the effective question — never the
//! hypothetical document or paraphrases used for retrieval. That asymmetry
//! is deliberate: the retrieval query is optimized for recall in embedding
//! space, the rerank query for precision against what the user actually
//! asked.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::index::ChunkHit;
use crate::services::EmbeddingProvider;
use crate::types::RagError;

/// Re-scores a candidate set against the question and keeps the best
/// `keep` entries.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        question: &str,
        candidates: Vec<ChunkHit>,
        keep: usize,
    ) -> Result<Vec<ChunkHit>, RagError>;
}

/// Default reranker: cosine similarity between the question embedding and
/// each candidate's text embedding.
pub struct EmbeddingReranker {
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingReranker {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    async fn rerank(
        &self,
        question: &str,
        candidates: Vec<ChunkHit>,
        keep: usize,
    ) -> Result<Vec<ChunkHit>, RagError> {
        if candidates.is_empty() || keep == 0 {
            return Ok(Vec::new());
        }
        let question_embedding = self.embeddings.embed_one(question).await?;
        let texts: Vec<String> = candidates
            .iter()
            .map(|hit| hit.chunk.content.clone())
            .collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;
        if vectors.len() != candidates.len() {
            return Err(RagError::service(
                "reranking",
                format!(
                    "scored {} candidates, received {} vectors",
                    candidates.len(),
                    vectors.len()
                ),
            ));
        }
        let mut scored: Vec<ChunkHit> = candidates
            .into_iter()
            .zip(vectors)
            .map(|(mut hit, vector)| {
                hit.score = cosine_similarity(&question_embedding, &vector);
                hit
            })
            .collect();
        // Stable sort keeps the original retrieval order for ties, which
        // keeps the final source list deterministic.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(keep);
        Ok(scored)
    }
}

/// Cosine similarity with a zero guard for degenerate vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
