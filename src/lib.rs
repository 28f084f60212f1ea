//! Documentation-site crawling, chunk ingestion, and retrieval-augmented
//! question answering.
//!
//! ```text
//! seed URL ──► crawler::Crawler ──► store::SqlitePageStore (pending pages)
//!                                             │
//!                     ingest::IngestPipeline ─┴─► chunker ──► services::EmbeddingProvider
//!                                             │
//!                                             └──► index::ChunkIndex (sqlite-vec)
//!
//! question ──► retrieval::Orchestrator
//!                 condense ──► strategy (HyDE | multi-query) ──► rerank ──► synthesize
//!                     │
//!                     └──► RetrievalResult { answer, sources, confidence }
//! ```
//!
//! Crawls stay inside the seed's domain under a depth and page budget;
//! ingestion flips the pending batch to processed or failed as a whole;
//! retrieval fails fast when no index exists and otherwise runs the staged
//! pipeline above. [`session::QueryService`] is the never-fails boundary
//! for presenting answers, and [`eval::EvalHarness`] scores the whole
//! pipeline with an external judge.

pub mod chunker;
pub mod config;
pub mod crawler;
pub mod eval;
pub mod history;
pub mod index;
pub mod ingest;
pub mod retrieval;
pub mod services;
pub mod session;
pub mod store;
pub mod types;

pub use config::Settings;
pub use crawler::{CrawlReport, Crawler, CrawlerOptions};
pub use history::{ChatHistory, ChatTurn};
pub use ingest::{IngestOutcome, IngestPipeline, IngestReport};
pub use retrieval::{Confidence, Orchestrator, RetrievalResult, SourceRef};
pub use session::{QueryOutcome, QueryService};
pub use store::{PageStatus, SqlitePageStore};
pub use types::RagError;
