//! Environment-driven configuration.
//!
//! Settings load from the process environment (with `.env` support via
//! `dotenvy`) and fall back to documented defaults, so a bare
//! `Settings::from_env()` is always usable for local experimentation.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::chunker::ChunkConfig;
use crate::retrieval::strategy::StrategyKind;
use crate::types::RagError;

/// User-Agent sent by the crawler and model-service clients.
pub const DEFAULT_USER_AGENT: &str = concat!("docsmith/", env!("CARGO_PKG_VERSION"));

/// Runtime configuration for every pipeline stage.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Embedding model served by the model host (`EMBED_MODEL`).
    pub embed_model: String,
    /// Generation model used for condensation, retrieval prompts, and
    /// synthesis (`LLM_MODEL`).
    pub llm_model: String,
    /// Sampling temperature for generation; kept near zero so answers are
    /// close to deterministic (`TEMPERATURE`).
    pub temperature: f32,
    /// Dimensionality of the embedding space (`EMBEDDING_DIMS`).
    pub embedding_dims: usize,
    /// Base URL of the model host (`OLLAMA_URL`).
    pub ollama_url: Url,
    /// Chunk window size in characters (`CHUNK_SIZE`).
    pub chunk_size: usize,
    /// Chunk overlap in characters (`CHUNK_OVERLAP`).
    pub chunk_overlap: usize,
    /// Page-store database path (`PAGES_DB`).
    pub pages_db: PathBuf,
    /// Vector-index database path (`INDEX_DB`).
    pub index_db: PathBuf,
    /// Candidates fetched per retrieval query (`RETRIEVAL_TOP_K`).
    pub top_k: usize,
    /// Candidates kept after reranking (`RERANK_KEEP`).
    pub keep_n: usize,
    /// Politeness delay between crawler requests (`CRAWL_DELAY_MS`).
    pub request_delay: Duration,
    /// Retrieval strategy: `hyde` or `multi-query` (`RETRIEVAL_STRATEGY`).
    pub strategy: StrategyKind,
    /// Paraphrase count for multi-query retrieval (`MULTI_QUERY_COUNT`).
    pub multi_query_count: usize,
    /// Flip page statuses per document instead of per batch
    /// (`INGEST_PER_PAGE_STATUS`).
    pub per_page_status: bool,
    /// Mirror saved pages as raw-text artifacts under this directory
    /// (`MIRROR_DIR`); unset disables mirroring.
    pub mirror_dir: Option<PathBuf>,
    /// User-Agent header for outbound requests (`USER_AGENT`).
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embed_model: "nomic-embed-text".to_string(),
            llm_model: "llama3.1".to_string(),
            temperature: 0.05,
            embedding_dims: 768,
            ollama_url: Url::parse("http://localhost:11434").expect("default host URL"),
            chunk_size: 1000,
            chunk_overlap: 150,
            pages_db: PathBuf::from("data/pages.sqlite"),
            index_db: PathBuf::from("data/chunks.sqlite"),
            top_k: 8,
            keep_n: 5,
            request_delay: Duration::from_millis(500),
            strategy: StrategyKind::Hyde,
            multi_query_count: 3,
            per_page_status: false,
            mirror_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let settings = Self {
            embed_model: env_or("EMBED_MODEL", defaults.embed_model),
            llm_model: env_or("LLM_MODEL", defaults.llm_model),
            temperature: env_parsed("TEMPERATURE", defaults.temperature)?,
            embedding_dims: env_parsed("EMBEDDING_DIMS", defaults.embedding_dims)?,
            ollama_url: env_parsed("OLLAMA_URL", defaults.ollama_url)?,
            chunk_size: env_parsed("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parsed("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            pages_db: env_or("PAGES_DB", defaults.pages_db.display().to_string()).into(),
            index_db: env_or("INDEX_DB", defaults.index_db.display().to_string()).into(),
            top_k: env_parsed("RETRIEVAL_TOP_K", defaults.top_k)?,
            keep_n: env_parsed("RERANK_KEEP", defaults.keep_n)?,
            request_delay: Duration::from_millis(env_parsed("CRAWL_DELAY_MS", 500u64)?),
            strategy: env_parsed("RETRIEVAL_STRATEGY", defaults.strategy)?,
            multi_query_count: env_parsed("MULTI_QUERY_COUNT", defaults.multi_query_count)?,
            per_page_status: env_parsed("INGEST_PER_PAGE_STATUS", defaults.per_page_status)?,
            mirror_dir: env::var("MIRROR_DIR").ok().map(PathBuf::from),
            user_agent: env_or("USER_AGENT", defaults.user_agent),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Chunking parameters as the chunker consumes them.
    pub fn chunking(&self) -> ChunkConfig {
        ChunkConfig {
            size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("CHUNK_SIZE must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 || self.keep_n == 0 {
            return Err(RagError::Config(
                "RETRIEVAL_TOP_K and RERANK_KEEP must be positive".into(),
            ));
        }
        if self.keep_n > self.top_k {
            return Err(RagError::Config(format!(
                "RERANK_KEEP ({}) cannot exceed RETRIEVAL_TOP_K ({})",
                self.keep_n, self.top_k
            )));
        }
        if self.embedding_dims == 0 {
            return Err(RagError::Config("EMBEDDING_DIMS must be positive".into()));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T>(key: &str, default: T) -> Result<T, RagError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| RagError::Config(format!("invalid {key} value '{raw}': {err}"))),
        Err(_) => Ok(default),
    }
}
