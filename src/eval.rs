//! Evaluation harness: scores the pipeline on faithfulness and relevancy.
//!
//! A fixed battery of questions runs through the orchestrator; an external
//! generation-service judge scores each answer on two axes. Scores that
//! fail to parse or are non-finite are excluded from the averages rather
//! than failing the run.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::retrieval::Orchestrator;
use crate::retrieval::prompts::PromptTemplate;
use crate::services::GenerationProvider;

/// Judge prompt for claim support: does the answer stay inside the
/// retrieved context?
pub static FAITHFULNESS_JUDGE: PromptTemplate = PromptTemplate::new(
    "faithfulness-judge",
    r#"You are grading an answer produced from retrieved documentation.

Question: {question}

Retrieved context:
{context}

Answer:
{answer}

Score from 0.0 to 1.0 how well every claim in the answer is supported by the retrieved context alone. Reply with only the number."#,
    &["question", "context", "answer"],
);

/// Judge prompt for relevancy: does the answer address the question?
pub static RELEVANCY_JUDGE: PromptTemplate = PromptTemplate::new(
    "relevancy-judge",
    r#"You are grading an answer to a documentation question.

Question: {question}

Answer:
{answer}

Score from 0.0 to 1.0 how directly the answer addresses the question. Reply with only the number."#,
    &["question", "answer"],
);

/// The stock battery exercised by evaluation runs.
pub fn default_battery() -> Vec<String> {
    [
        "How do I define a mapped model class in the current API?",
        "What is the difference between executing a statement and using the legacy query interface?",
        "How do I create an asynchronous engine?",
        "Explain how typed column annotations work in model definitions.",
        "What replaced the old declarative base constructor?",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Batch-averaged scores plus bookkeeping about what was excluded.
#[derive(Clone, Debug, Default)]
pub struct EvalReport {
    /// Mean faithfulness over questions with a usable score.
    pub faithfulness: Option<f32>,
    /// Mean relevancy over questions with a usable score.
    pub relevancy: Option<f32>,
    /// Questions that produced an answer.
    pub evaluated: usize,
    /// Questions whose pipeline run failed, with the error text.
    pub failures: Vec<(String, String)>,
}

/// Runs the battery and aggregates judge scores.
pub struct EvalHarness {
    orchestrator: Orchestrator,
    judge: Arc<dyn GenerationProvider>,
}

impl EvalHarness {
    pub fn new(orchestrator: Orchestrator, judge: Arc<dyn GenerationProvider>) -> Self {
        Self {
            orchestrator,
            judge,
        }
    }

    pub async fn run(&self, questions: &[String]) -> EvalReport {
        let mut faithfulness = Vec::new();
        let mut relevancy = Vec::new();
        let mut report = EvalReport::default();

        for question in questions {
            let (result, retained) = match self.orchestrator.answer_traced(question, &[]).await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(question = %question, error = %err, "evaluation query failed");
                    report.failures.push((question.clone(), err.to_string()));
                    continue;
                }
            };
            report.evaluated += 1;

            let context = retained
                .iter()
                .map(|hit| hit.chunk.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            if let Some(score) = self
                .score(
                    &FAITHFULNESS_JUDGE,
                    &[
                        ("question", question.as_str()),
                        ("context", &context),
                        ("answer", &result.answer),
                    ],
                )
                .await
            {
                faithfulness.push(score);
            }
            if let Some(score) = self
                .score(
                    &RELEVANCY_JUDGE,
                    &[
                        ("question", question.as_str()),
                        ("answer", &result.answer),
                    ],
                )
                .await
            {
                relevancy.push(score);
            }
        }

        report.faithfulness = mean(&faithfulness);
        report.relevancy = mean(&relevancy);
        info!(
            evaluated = report.evaluated,
            failures = report.failures.len(),
            faithfulness = ?report.faithfulness,
            relevancy = ?report.relevancy,
            "evaluation complete"
        );
        report
    }

    async fn score(&self, template: &PromptTemplate, values: &[(&str, &str)]) -> Option<f32> {
        let prompt = match template.render(values) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(metric = template.name(), error = %err, "judge prompt failed to render");
                return None;
            }
        };
        match self.judge.generate(&prompt).await {
            Ok(reply) => parse_score(&reply),
            Err(err) => {
                warn!(metric = template.name(), error = %err, "judge call failed");
                None
            }
        }
    }
}

/// Pulls the first number out of a judge reply; unusable replies score
/// nothing.
pub(crate) fn parse_score(reply: &str) -> Option<f32> {
    static SCORE: OnceLock<Regex> = OnceLock::new();
    let pattern = SCORE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("score regex"));
    let matched = pattern.find(reply)?;
    let value: f32 = matched.as_str().parse().ok()?;
    value.is_finite().then_some(value)
}

fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}
