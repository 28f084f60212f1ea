//! End-to-end retrieval tests with mock model services and a real
//! sqlite-vec index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use docsmith::eval::EvalHarness;
use docsmith::history::ChatTurn;
use docsmith::index::{ChunkDocument, ChunkHit, ChunkIndex};
use docsmith::retrieval::prompts::FALLBACK_ANSWER;
use docsmith::retrieval::rerank::Reranker;
use docsmith::retrieval::{Confidence, MultiQueryStrategy, Orchestrator};
use docsmith::services::{MockEmbeddingProvider, MockGenerationProvider};
use docsmith::session::{INDEX_MISSING_MESSAGE, QueryOutcome, QueryService};
use docsmith::types::RagError;

const DIMS: usize = 8;

/// Retains nothing, forcing the zero-chunk fallback path.
struct EmptyReranker;

#[async_trait]
impl Reranker for EmptyReranker {
    async fn rerank(
        &self,
        _question: &str,
        _candidates: Vec<ChunkHit>,
        _keep: usize,
    ) -> Result<Vec<ChunkHit>, RagError> {
        Ok(Vec::new())
    }
}

/// Builds an index at `path` holding the given `(url, content)` chunks,
/// embedded with the same mock provider the orchestrator will use.
async fn seed_index(path: &Path, provider: &MockEmbeddingProvider, chunks: &[(&str, &str)]) {
    let index = ChunkIndex::open_or_create(path, DIMS).await.unwrap();
    let documents = chunks
        .iter()
        .enumerate()
        .map(|(position, (url, content))| {
            (
                ChunkDocument::new(*url, "Title", position, *content),
                provider.vector_for(content),
            )
        })
        .collect();
    index.add_chunks(documents).await.unwrap();
}

fn orchestrator_with(
    index_path: impl Into<PathBuf>,
    embeddings: Arc<MockEmbeddingProvider>,
    generator: Arc<MockGenerationProvider>,
) -> Orchestrator {
    Orchestrator::builder()
        .index_path(index_path)
        .dims(DIMS)
        .embeddings(embeddings)
        .generator(generator)
        .build()
        .unwrap()
}

#[tokio::test]
async fn missing_index_fails_before_any_service_call() {
    let dir = tempdir().unwrap();
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    let generator = Arc::new(MockGenerationProvider::new());
    let orchestrator = orchestrator_with(
        dir.path().join("never-created.sqlite"),
        embeddings.clone(),
        generator.clone(),
    );

    let err = orchestrator.answer("anything", &[]).await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound(_)));
    assert!(embeddings.embedded().is_empty(), "no embedding call expected");
    assert_eq!(generator.call_count(), 0, "no generation call expected");
}

#[tokio::test]
async fn hyde_answers_with_sources_and_high_confidence() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[
            ("https://docs.example.com/engines.html", "engines create database connections"),
            ("https://docs.example.com/engines.html", "engine configuration options"),
            ("https://docs.example.com/sessions.html", "sessions track unit of work state"),
        ],
    )
    .await;

    let generator = Arc::new(MockGenerationProvider::with_replies([
        "Engines are factories for database connections.",
        "Engines create connections [Source: engines.html]",
    ]));
    let orchestrator = orchestrator_with(&index_path, embeddings.clone(), generator.clone());

    let result = orchestrator
        .answer("how do engines work", &[])
        .await
        .unwrap();

    assert_eq!(result.answer, "Engines create connections [Source: engines.html]");
    assert_eq!(result.confidence, Confidence::High);
    // Three retained chunks from two pages: deduplicated to two sources,
    // no locator repeated.
    assert_eq!(result.sources.len(), 2);
    let locators: Vec<_> = result.sources.iter().map(|s| s.locator.as_str()).collect();
    let mut unique = locators.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), locators.len());

    // First generation call drafted the hypothetical document; the
    // fabricated passage (not the question) is what got embedded next.
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Passage:"));
    assert!(
        embeddings
            .embedded()
            .contains(&"Engines are factories for database connections.".to_string()),
        "the hypothetical document should be the embedding query"
    );
    // The final call is the answer prompt, built on the raw question.
    assert!(prompts[1].contains("how do engines work"));
}

#[tokio::test]
async fn history_triggers_condensation_before_retrieval() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[("https://docs.example.com/engines.html", "engines create database connections")],
    )
    .await;

    let generator = Arc::new(MockGenerationProvider::with_replies([
        "How do I create an engine with the connection factory?",
        "You create an engine from a connection URL.",
        "Call the engine constructor [Source: engines.html]",
    ]));
    let orchestrator = orchestrator_with(&index_path, embeddings, generator.clone());

    let history = vec![ChatTurn::new(
        "What is an engine?",
        "It's a connection factory.",
    )];
    let result = orchestrator
        .answer("How do I create one?", &history)
        .await
        .unwrap();
    assert_eq!(result.confidence, Confidence::High);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    // First call is condensation over the transcript.
    assert!(prompts[0].contains("Standalone question"));
    assert!(prompts[0].contains("Human: What is an engine?"));
    assert!(prompts[0].contains("Input: How do I create one?"));
    // Downstream stages use the condensed question, not the bare pronoun.
    assert!(prompts[1].contains("How do I create an engine with the connection factory?"));
    assert!(prompts[2].contains("How do I create an engine with the connection factory?"));
}

#[tokio::test]
async fn empty_history_skips_condensation() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[("https://docs.example.com/engines.html", "engines create database connections")],
    )
    .await;

    let generator = Arc::new(MockGenerationProvider::with_replies([
        "A hypothetical passage about engines.",
        "final answer",
    ]));
    let orchestrator = orchestrator_with(&index_path, embeddings, generator.clone());

    orchestrator.answer("how do engines work", &[]).await.unwrap();
    let prompts = generator.prompts();
    assert!(
        prompts[0].contains("Passage:"),
        "with no history the first call must be the strategy, not condensation"
    );
}

#[tokio::test]
async fn zero_retained_chunks_returns_the_verbatim_fallback() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[("https://docs.example.com/engines.html", "engines create database connections")],
    )
    .await;

    let generator = Arc::new(MockGenerationProvider::with_replies([
        "A hypothetical passage.",
    ]));
    let orchestrator = Orchestrator::builder()
        .index_path(&index_path)
        .dims(DIMS)
        .embeddings(embeddings)
        .generator(generator.clone())
        .reranker(Arc::new(EmptyReranker))
        .build()
        .unwrap();

    let result = orchestrator.answer("something unrelated", &[]).await.unwrap();
    assert_eq!(result.answer, FALLBACK_ANSWER);
    assert!(result.sources.is_empty());
    assert_eq!(result.confidence, Confidence::Low);
    // Only the strategy's generation ran; synthesis was skipped entirely.
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn multi_query_unions_paraphrase_results() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[
            ("https://docs.example.com/engines.html", "engines create database connections"),
            ("https://docs.example.com/sessions.html", "sessions track unit of work state"),
        ],
    )
    .await;

    let generator = Arc::new(MockGenerationProvider::with_replies([
        "how are engines constructed\nwhat builds database connections",
        "final synthesized answer",
    ]));
    let orchestrator = Orchestrator::builder()
        .index_path(&index_path)
        .dims(DIMS)
        .embeddings(embeddings.clone())
        .generator(generator.clone())
        .strategy(Arc::new(MultiQueryStrategy::new(2)))
        .build()
        .unwrap();

    let result = orchestrator.answer("how do engines work", &[]).await.unwrap();
    assert_eq!(result.answer, "final synthesized answer");
    assert_eq!(result.confidence, Confidence::High);

    // Both paraphrases were embedded as retrieval queries.
    let embedded = embeddings.embedded();
    assert!(embedded.contains(&"how are engines constructed".to_string()));
    assert!(embedded.contains(&"what builds database connections".to_string()));

    // Union dedup: no chunk id appears twice in the source walk, so the
    // source list has unique locators.
    let locators: Vec<_> = result.sources.iter().map(|s| s.locator.as_str()).collect();
    let mut unique = locators.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), locators.len());
}

#[tokio::test]
async fn query_service_resolves_missing_index_to_a_structured_outcome() {
    let dir = tempdir().unwrap();
    let orchestrator = orchestrator_with(
        dir.path().join("never-created.sqlite"),
        Arc::new(MockEmbeddingProvider::new(DIMS)),
        Arc::new(MockGenerationProvider::new()),
    );
    let service = QueryService::new(orchestrator);

    match service.respond("anything", &[]).await {
        QueryOutcome::IndexMissing { message } => assert_eq!(message, INDEX_MISSING_MESSAGE),
        other => panic!("expected IndexMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn eval_harness_averages_scores_and_excludes_unparsable_ones() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("chunks.sqlite");
    let embeddings = Arc::new(MockEmbeddingProvider::new(DIMS));
    seed_index(
        &index_path,
        &embeddings,
        &[("https://docs.example.com/engines.html", "engines create database connections")],
    )
    .await;

    // Two questions, each consuming a hyde reply and an answer reply.
    let generator = Arc::new(MockGenerationProvider::with_replies([
        "passage one",
        "answer one",
        "passage two",
        "answer two",
    ]));
    let orchestrator = orchestrator_with(&index_path, embeddings, generator);

    // Per question: faithfulness judged first, then relevancy. The second
    // faithfulness reply is garbage and must be excluded, not averaged.
    let judge = Arc::new(MockGenerationProvider::with_replies([
        "0.9", "0.8", "not a number", "0.6",
    ]));
    let harness = EvalHarness::new(orchestrator, judge);

    let questions = vec!["first question".to_string(), "second question".to_string()];
    let report = harness.run(&questions).await;

    assert_eq!(report.evaluated, 2);
    assert!(report.failures.is_empty());
    let faithfulness = report.faithfulness.unwrap();
    assert!((faithfulness - 0.9).abs() < 1e-6);
    let relevancy = report.relevancy.unwrap();
    assert!((relevancy - 0.7).abs() < 1e-6);
}
