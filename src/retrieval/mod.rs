//! The retrieval orchestrator: condense → retrieve → rerank → synthesize.
//!
//! Stage order is strict and the query asymmetry matters: retrieval runs on
//! a strategy-derived query (hypothetical document or paraphrases) while
//! reranking and synthesis always use the effective question. A missing
//! vector index fails before any model service is consulted; service
//! failures propagate to the caller untouched.

pub mod prompts;
pub mod rerank;
pub mod strategy;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::Settings;
use crate::history::{ChatTurn, HISTORY_WINDOW, format_transcript};
use crate::index::{ChunkHit, ChunkIndex};
use crate::services::{
    EmbeddingProvider, GenerationProvider, OllamaClient, OllamaEmbeddings, OllamaGenerator,
};
use crate::types::RagError;

pub use rerank::{EmbeddingReranker, Reranker};
pub use strategy::{HydeStrategy, MultiQueryStrategy, RetrievalStrategy, StrategyKind};

/// Coarse retrieval-sufficiency signal, not a calibrated probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// The confidence rule: high iff at least one chunk survived reranking.
pub fn confidence_for(retained: usize) -> Confidence {
    if retained > 0 {
        Confidence::High
    } else {
        Confidence::Low
    }
}

/// A cited source: display name plus the URL or path it resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub name: String,
    pub locator: String,
}

/// What a query returns to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct RetrievalResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
}

/// Runs the full answer pipeline against a persisted vector index.
pub struct Orchestrator {
    index_path: PathBuf,
    dims: usize,
    embeddings: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    reranker: Arc<dyn Reranker>,
    strategy: Arc<dyn RetrievalStrategy>,
    top_k: usize,
    keep_n: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("index_path", &self.index_path)
            .field("dims", &self.dims)
            .field("top_k", &self.top_k)
            .field("keep_n", &self.keep_n)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Wires an orchestrator to the configured model host and strategy.
    pub fn from_settings(settings: &Settings) -> Result<Self, RagError> {
        let client = OllamaClient::new(settings.ollama_url.clone(), &settings.user_agent)?;
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbeddings::new(
            client.clone(),
            settings.embed_model.clone(),
        ));
        let generator: Arc<dyn GenerationProvider> = Arc::new(OllamaGenerator::new(
            client,
            settings.llm_model.clone(),
            settings.temperature,
        ));
        let strategy: Arc<dyn RetrievalStrategy> = match settings.strategy {
            StrategyKind::Hyde => Arc::new(HydeStrategy),
            StrategyKind::MultiQuery => {
                Arc::new(MultiQueryStrategy::new(settings.multi_query_count))
            }
        };
        Self::builder()
            .index_path(settings.index_db.clone())
            .dims(settings.embedding_dims)
            .embeddings(embeddings)
            .generator(generator)
            .strategy(strategy)
            .top_k(settings.top_k)
            .keep_n(settings.keep_n)
            .build()
    }

    /// Answers `question`, using `history` for condensation when present.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<RetrievalResult, RagError> {
        self.answer_traced(question, history)
            .await
            .map(|(result, _)| result)
    }

    /// Like [`answer`](Self::answer) but also returns the retained chunks,
    /// which the evaluation harness needs as judge context.
    pub async fn answer_traced(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<(RetrievalResult, Vec<ChunkHit>), RagError> {
        // The index must exist before any model service is consulted.
        let index = ChunkIndex::open_existing(&self.index_path, self.dims).await?;

        let effective = self.condense(question, history).await?;
        let cx = strategy::StrategyContext {
            index: &index,
            embeddings: self.embeddings.as_ref(),
            generator: self.generator.as_ref(),
            top_k: self.top_k,
        };
        let candidates = self.strategy.retrieve(&cx, &effective).await?;
        debug!(
            strategy = self.strategy.name(),
            candidates = candidates.len(),
            "retrieval complete"
        );

        // Rerank against the effective question, never the retrieval query.
        let retained = self
            .reranker
            .rerank(&effective, candidates, self.keep_n)
            .await?;
        if retained.is_empty() {
            debug!("no chunks survived reranking; returning fallback");
            let result = RetrievalResult {
                answer: prompts::FALLBACK_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: confidence_for(0),
            };
            return Ok((result, Vec::new()));
        }

        let context = assemble_context(&retained);
        let prompt = prompts::ANSWER.render(&[("context", &context), ("question", &effective)])?;
        let answer = self.generator.generate(&prompt).await?;

        let result = RetrievalResult {
            answer,
            sources: extract_sources(&retained),
            confidence: confidence_for(retained.len()),
        };
        Ok((result, retained))
    }

    /// Rewrites a follow-up into a standalone question using the last few
    /// turns; an empty history passes the question through untouched.
    async fn condense(&self, question: &str, history: &[ChatTurn]) -> Result<String, RagError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let window = if history.len() > HISTORY_WINDOW {
            &history[history.len() - HISTORY_WINDOW..]
        } else {
            history
        };
        let transcript = format_transcript(window);
        let prompt =
            prompts::CONDENSE.render(&[("chat_history", &transcript), ("question", question)])?;
        let condensed = self.generator.generate(&prompt).await?;
        let condensed = condensed.trim();
        if condensed.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(condensed.to_string())
        }
    }
}

/// Concatenates retained chunks in rerank order with their citation tags.
pub fn assemble_context(chunks: &[ChunkHit]) -> String {
    chunks
        .iter()
        .map(|hit| {
            format!(
                "[Source: {}]\n{}",
                source_name(&hit.chunk.url),
                hit.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Walks retained chunks in rank order and builds the deduplicated source
/// list; the first occurrence of a locator wins.
pub fn extract_sources(chunks: &[ChunkHit]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for hit in chunks {
        if seen.insert(hit.chunk.url.clone()) {
            sources.push(SourceRef {
                name: source_name(&hit.chunk.url),
                locator: hit.chunk.url.clone(),
            });
        }
    }
    sources
}

/// Display name for a locator: the base filename of a URL path, the host
/// for path-less URLs, or the file name of a local path.
pub fn source_name(locator: &str) -> String {
    if let Ok(url) = Url::parse(locator) {
        if let Some(segments) = url.path_segments() {
            if let Some(last) = segments.filter(|segment| !segment.is_empty()).last() {
                return last.to_string();
            }
        }
        if let Some(host) = url.host_str() {
            return host.to_string();
        }
        return locator.to_string();
    }
    Path::new(locator)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| locator.to_string())
}

/// Builder for [`Orchestrator`]; index path, embeddings, and generator are
/// required, everything else has defaults.
#[derive(Default)]
pub struct OrchestratorBuilder {
    index_path: Option<PathBuf>,
    dims: Option<usize>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
    strategy: Option<Arc<dyn RetrievalStrategy>>,
    top_k: Option<usize>,
    keep_n: Option<usize>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    #[must_use]
    pub fn embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn RetrievalStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn keep_n(mut self, keep_n: usize) -> Self {
        self.keep_n = Some(keep_n);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RagError> {
        let index_path = self
            .index_path
            .ok_or_else(|| RagError::Config("orchestrator requires an index path".into()))?;
        let embeddings = self
            .embeddings
            .ok_or_else(|| RagError::Config("orchestrator requires an embedding provider".into()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::Config("orchestrator requires a generation provider".into()))?;
        let reranker = self
            .reranker
            .unwrap_or_else(|| Arc::new(EmbeddingReranker::new(embeddings.clone())));
        let strategy = self.strategy.unwrap_or_else(|| Arc::new(HydeStrategy));
        let top_k = self.top_k.unwrap_or(8);
        let keep_n = self.keep_n.unwrap_or(5);
        if keep_n == 0 || top_k == 0 {
            return Err(RagError::Config(
                "top_k and keep_n must both be positive".into(),
            ));
        }
        if keep_n > top_k {
            return Err(RagError::Config(format!(
                "keep_n ({keep_n}) cannot exceed top_k ({top_k})"
            )));
        }
        Ok(Orchestrator {
            index_path,
            dims: self.dims.unwrap_or(768),
            embeddings,
            generator,
            reranker,
            strategy,
            top_k,
            keep_n,
        })
    }
}
