//! The query boundary: every failure resolves to a structured outcome.
//!
//! Callers presenting answers to users go through [`QueryService`], which
//! maps a missing index to a "run ingestion first" outcome and any other
//! failure to a generic one, logging the detail. Nothing escapes as an
//! unhandled error.

use tracing::error;

use crate::history::ChatTurn;
use crate::retrieval::{Orchestrator, RetrievalResult};
use crate::types::RagError;

/// Shown when retrieval is attempted before any ingestion run.
pub const INDEX_MISSING_MESSAGE: &str =
    "The knowledge base has not been ingested yet. Crawl a documentation site and run ingestion, then ask again.";

/// Shown for any other retrieval failure; the detail goes to the log.
pub const FAILURE_MESSAGE: &str =
    "Something went wrong while answering. Try rephrasing the question.";

/// Tagged outcome distinguishing success, not-yet-initialized, and genuine
/// failure, so callers never match on error strings.
#[derive(Debug)]
pub enum QueryOutcome {
    Answered(RetrievalResult),
    IndexMissing { message: &'static str },
    Failed { message: &'static str, detail: String },
}

/// Boundary wrapper around the orchestrator.
pub struct QueryService {
    orchestrator: Orchestrator,
}

impl QueryService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Answers a question; never fails at this boundary.
    pub async fn respond(&self, question: &str, history: &[ChatTurn]) -> QueryOutcome {
        match self.orchestrator.answer(question, history).await {
            Ok(result) => QueryOutcome::Answered(result),
            Err(RagError::IndexNotFound(path)) => {
                error!(path = %path.display(), "query attempted before ingestion");
                QueryOutcome::IndexMissing {
                    message: INDEX_MISSING_MESSAGE,
                }
            }
            Err(err) => {
                error!(error = %err, "query failed");
                QueryOutcome::Failed {
                    message: FAILURE_MESSAGE,
                    detail: err.to_string(),
                }
            }
        }
    }
}
