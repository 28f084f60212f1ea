//! Pluggable retrieval strategies.
//!
//! HyDE and multi-query expansion are the same pipeline with a different
//! front half: both turn the effective question into one or more embedding
//! queries, search the index, and hand a candidate set to the shared
//! rerank/synthesize stages.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::debug;

use crate::index::{ChunkHit, ChunkIndex};
use crate::retrieval::prompts;
use crate::services::{EmbeddingProvider, GenerationProvider};
use crate::types::RagError;

/// Which retrieval strategy a deployment runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Hyde,
    MultiQuery,
}

impl FromStr for StrategyKind {
    type Err = RagError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hyde" => Ok(StrategyKind::Hyde),
            "multi-query" | "multi_query" | "multiquery" => Ok(StrategyKind::MultiQuery),
            other => Err(RagError::Config(format!(
                "unknown retrieval strategy '{other}' (expected 'hyde' or 'multi-query')"
            ))),
        }
    }
}

/// Everything a strategy may consult while gathering candidates.
pub struct StrategyContext<'a> {
    pub index: &'a ChunkIndex,
    pub embeddings: &'a dyn EmbeddingProvider,
    pub generator: &'a dyn GenerationProvider,
    pub top_k: usize,
}

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Gathers candidate chunks for the effective question.
    async fn retrieve(
        &self,
        cx: &StrategyContext<'_>,
        question: &str,
    ) -> Result<Vec<ChunkHit>, RagError>;
}

/// Hypothetical-document retrieval: generate a fabricated answer passage
/// and embed *it*, not the question. The fabricated passage tends to sit
/// closer in embedding space to genuine answer passages than a short
/// question does, and is discarded after search.
pub struct HydeStrategy;

#[async_trait]
impl RetrievalStrategy for HydeStrategy {
    fn name(&self) -> &'static str {
        "hyde"
    }

    async fn retrieve(
        &self,
        cx: &StrategyContext<'_>,
        question: &str,
    ) -> Result<Vec<ChunkHit>, RagError> {
        let prompt = prompts::HYPOTHETICAL_DOCUMENT.render(&[("question", question)])?;
        let document = cx.generator.generate(&prompt).await?;
        debug!(chars = document.len(), "generated hypothetical document");
        let embedding = cx.embeddings.embed_one(&document).await?;
        cx.index.search(&embedding, cx.top_k).await
    }
}

/// Multi-query expansion: paraphrase the question several ways, retrieve
/// top-K per paraphrase, and union the results with first-seen ordering.
pub struct MultiQueryStrategy {
    variants: usize,
}

impl MultiQueryStrategy {
    pub fn new(variants: usize) -> Self {
        Self {
            variants: variants.max(1),
        }
    }
}

impl Default for MultiQueryStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl RetrievalStrategy for MultiQueryStrategy {
    fn name(&self) -> &'static str {
        "multi-query"
    }

    async fn retrieve(
        &self,
        cx: &StrategyContext<'_>,
        question: &str,
    ) -> Result<Vec<ChunkHit>, RagError> {
        let count = self.variants.to_string();
        let prompt = prompts::MULTI_QUERY.render(&[("question", question), ("count", &count)])?;
        let raw = cx.generator.generate(&prompt).await?;
        let mut queries = parse_query_lines(&raw);
        if queries.is_empty() {
            queries.push(question.to_string());
        }
        debug!(queries = queries.len(), "expanded question");

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for query in &queries {
            let embedding = cx.embeddings.embed_one(query).await?;
            for hit in cx.index.search(&embedding, cx.top_k).await? {
                if seen.insert(hit.chunk.id.clone()) {
                    merged.push(hit);
                }
            }
        }
        Ok(merged)
    }
}

/// Extracts usable queries from a model reply, tolerating bullets and
/// numbered lists despite the prompt asking for bare lines.
pub(crate) fn parse_query_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .map(strip_listing_prefix)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_listing_prefix(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*']).trim_start();
    let without_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() != line.len() {
        if let Some(rest) = without_digits
            .strip_prefix('.')
            .or_else(|| without_digits.strip_prefix(')'))
        {
            return rest.trim_start();
        }
    }
    line
}
