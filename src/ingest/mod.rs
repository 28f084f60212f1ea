//! Embedding indexer: turns pending pages into indexed chunks.
//!
//! The whole pending set is one batch. On success every page flips to
//! processed with a shared timestamp; on any embed or index-write failure
//! the whole batch flips to failed. That coarse lifecycle is deliberate —
//! per-document granularity exists behind
//! [`IngestPipeline::with_per_page_status`] for deployments that want it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chunker::{self, ChunkConfig};
use crate::index::{ChunkDocument, ChunkIndex};
use crate::services::EmbeddingProvider;
use crate::store::{PageRecord, SqlitePageStore};
use crate::types::RagError;

/// Counters for a completed ingestion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub chunks_created: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
}

/// Outcome of an ingestion run. Zero pending pages is a distinct no-op,
/// not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    NothingPending,
    Completed(IngestReport),
}

/// Chunks, embeds, and indexes pending pages.
pub struct IngestPipeline {
    pages: SqlitePageStore,
    embeddings: Arc<dyn EmbeddingProvider>,
    index_path: PathBuf,
    dims: usize,
    chunking: ChunkConfig,
    per_page_status: bool,
}

impl IngestPipeline {
    pub fn new(
        pages: SqlitePageStore,
        embeddings: Arc<dyn EmbeddingProvider>,
        index_path: impl Into<PathBuf>,
        dims: usize,
        chunking: ChunkConfig,
    ) -> Self {
        Self {
            pages,
            embeddings,
            index_path: index_path.into(),
            dims,
            chunking,
            per_page_status: false,
        }
    }

    /// Wires a pipeline to the configured model host and paths.
    pub fn from_settings(
        settings: &crate::config::Settings,
        pages: SqlitePageStore,
    ) -> Result<Self, RagError> {
        let client = crate::services::OllamaClient::new(
            settings.ollama_url.clone(),
            &settings.user_agent,
        )?;
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(
            crate::services::OllamaEmbeddings::new(client, settings.embed_model.clone()),
        );
        Ok(Self::new(
            pages,
            embeddings,
            settings.index_db.clone(),
            settings.embedding_dims,
            settings.chunking(),
        )
        .with_per_page_status(settings.per_page_status))
    }

    /// Flip page statuses individually instead of as one batch, so pages
    /// indexed before a mid-run failure keep their processed status.
    #[must_use]
    pub fn with_per_page_status(mut self, enabled: bool) -> Self {
        self.per_page_status = enabled;
        self
    }

    /// Runs one ingestion pass over everything currently pending.
    pub async fn ingest(&self) -> Result<IngestOutcome, RagError> {
        let pending = self.pages.pending().await?;
        if pending.is_empty() {
            info!("no pending pages to ingest");
            return Ok(IngestOutcome::NothingPending);
        }
        info!(pages = pending.len(), "ingesting pending pages");

        let index = match ChunkIndex::open_or_create(&self.index_path, self.dims).await {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "could not open vector index; failing the batch");
                return self.fail_all(&pending, 0).await;
            }
        };

        if self.per_page_status {
            self.ingest_per_page(&index, pending).await
        } else {
            self.ingest_batch(&index, pending).await
        }
    }

    async fn ingest_batch(
        &self,
        index: &ChunkIndex,
        pending: Vec<PageRecord>,
    ) -> Result<IngestOutcome, RagError> {
        let urls: Vec<String> = pending.iter().map(|page| page.url.clone()).collect();
        let total = pending.len();
        let mut chunks_created = 0;
        match self.embed_and_store(index, &pending, &mut chunks_created).await {
            Ok(()) => {
                self.pages.mark_processed(&urls, Utc::now()).await?;
                info!(
                    pages = total,
                    chunks = chunks_created,
                    "ingestion complete; batch marked processed"
                );
                Ok(IngestOutcome::Completed(IngestReport {
                    chunks_created,
                    pages_processed: total,
                    pages_failed: 0,
                }))
            }
            Err(err) => {
                warn!(error = %err, "ingestion failed; marking whole batch as failed");
                self.fail_all(&pending, chunks_created).await
            }
        }
    }

    async fn ingest_per_page(
        &self,
        index: &ChunkIndex,
        pending: Vec<PageRecord>,
    ) -> Result<IngestOutcome, RagError> {
        let mut report = IngestReport::default();
        for page in &pending {
            let mut written = 0;
            match self
                .embed_and_store(index, std::slice::from_ref(page), &mut written)
                .await
            {
                Ok(()) => {
                    self.pages
                        .mark_processed(std::slice::from_ref(&page.url), Utc::now())
                        .await?;
                    report.pages_processed += 1;
                    report.chunks_created += written;
                }
                Err(err) => {
                    warn!(url = %page.url, error = %err, "page failed to ingest");
                    self.pages
                        .mark_failed(std::slice::from_ref(&page.url))
                        .await?;
                    report.pages_failed += 1;
                    report.chunks_created += written;
                }
            }
        }
        info!(
            pages = report.pages_processed,
            failed = report.pages_failed,
            chunks = report.chunks_created,
            "per-page ingestion complete"
        );
        Ok(IngestOutcome::Completed(report))
    }

    async fn embed_and_store(
        &self,
        index: &ChunkIndex,
        pages: &[PageRecord],
        written: &mut usize,
    ) -> Result<(), RagError> {
        for page in pages {
            let windows = chunker::split_text(&page.content, &self.chunking);
            if windows.is_empty() {
                debug!(url = %page.url, "page produced no chunks");
                continue;
            }
            let vectors = self.embeddings.embed_batch(&windows).await?;
            if vectors.len() != windows.len() {
                return Err(RagError::service(
                    "embedding",
                    format!(
                        "requested {} embeddings, received {}",
                        windows.len(),
                        vectors.len()
                    ),
                ));
            }
            let count = windows.len();
            let documents: Vec<(ChunkDocument, Vec<f32>)> = windows
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(position, (content, vector))| {
                    (
                        ChunkDocument::new(&page.url, &page.title, position, content),
                        vector,
                    )
                })
                .collect();
            index.add_chunks(documents).await?;
            *written += count;
            debug!(url = %page.url, chunks = count, "indexed page");
        }
        Ok(())
    }

    async fn fail_all(
        &self,
        pending: &[PageRecord],
        chunks_created: usize,
    ) -> Result<IngestOutcome, RagError> {
        let urls: Vec<String> = pending.iter().map(|page| page.url.clone()).collect();
        self.pages.mark_failed(&urls).await?;
        Ok(IngestOutcome::Completed(IngestReport {
            chunks_created,
            pages_processed: 0,
            pages_failed: pending.len(),
        }))
    }
}
