//! Typed prompt templates with named, validated slots.
//!
//! Every prompt in the pipeline is a [`PromptTemplate`]: rendering checks
//! that the provided values match the declared slots exactly, so a template
//! can never ship with an unfilled placeholder or accept a value it has no
//! slot for.

use crate::types::RagError;

/// Sentence returned verbatim whenever the retrieved context has nothing to
/// say about the question. Also embedded in the answer instructions so the
/// model uses the same wording when it judges the context insufficient.
pub const FALLBACK_ANSWER: &str = "This specific detail isn't in my current archives.";

/// A prompt body with `{slot}` placeholders and the exact set of slots it
/// requires.
pub struct PromptTemplate {
    name: &'static str,
    body: &'static str,
    slots: &'static [&'static str],
}

impl PromptTemplate {
    pub const fn new(
        name: &'static str,
        body: &'static str,
        slots: &'static [&'static str],
    ) -> Self {
        Self { name, body, slots }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Renders the template. Fails on unknown keys, missing slots, or a
    /// slot with no placeholder in the body.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, RagError> {
        for (key, _) in values {
            if !self.slots.contains(key) {
                return Err(RagError::Template(format!(
                    "template '{}' has no slot named '{key}'",
                    self.name
                )));
            }
        }
        let mut rendered = self.body.to_string();
        for slot in self.slots {
            let (_, value) = values
                .iter()
                .find(|(key, _)| key == slot)
                .ok_or_else(|| {
                    RagError::Template(format!(
                        "template '{}' is missing a value for slot '{slot}'",
                        self.name
                    ))
                })?;
            let marker = format!("{{{slot}}}");
            if !rendered.contains(&marker) {
                return Err(RagError::Template(format!(
                    "template '{}' declares slot '{slot}' but its body has no {marker}",
                    self.name
                )));
            }
            rendered = rendered.replace(&marker, value);
        }
        Ok(rendered)
    }
}

/// Answer synthesis. The instructions are a fixed contract: deprecation
/// warnings for legacy-only context, a migration path when legacy and
/// modern material are both present, verbatim fallback when the context is
/// silent, and exact `[Source: name]` citation tags.
pub static ANSWER: PromptTemplate = PromptTemplate::new(
    "answer",
    r#"<role>
You are a senior software engineer with deep knowledge of the documentation provided below.
You specialize in bridging legacy and modern versions of the same library, and you teach how the API evolved rather than just quoting it.
</role>

<context>
{context}
</context>

<user_query>
{question}
</user_query>

<instructions>
- If the context contains only legacy patterns, explain them but open with an explicit warning that they are deprecated; check which version the context refers to before writing the warning.
- If the context contains both legacy and modern patterns, present a migration path: what the old version did, then what the new version does instead.
- Be concise and code-heavy.
- Address the reader as "you" and use "we" when walking through steps.
- Skip generic introductions; start directly with the solution.
- Cite every passage you rely on using the exact form [Source: filename].
- If the answer is not in the provided context, reply exactly: "This specific detail isn't in my current archives."
</instructions>
"#,
    &["context", "question"],
);

/// Rewrites a follow-up into a standalone technical question.
pub static CONDENSE: PromptTemplate = PromptTemplate::new(
    "condense",
    r#"Given the conversation so far and a follow-up input, rewrite the input as a standalone technical question.
Preserve the specific technical terms the conversation refers to (for example "session", "engine", "declarative").

History:
{chat_history}

Input: {question}

Standalone question:"#,
    &["chat_history", "question"],
);

/// Drafts a fabricated answer passage whose embedding stands in for the
/// question during retrieval. The passage is discarded after search.
pub static HYPOTHETICAL_DOCUMENT: PromptTemplate = PromptTemplate::new(
    "hypothetical-document",
    r#"Write a short passage that could appear in technical documentation and that directly answers the question below.
Write it as confident reference material even though it is a draft: it is only used to search real documentation and is never shown to anyone.

Question: {question}

Passage:"#,
    &["question"],
);

/// Produces paraphrases for multi-query retrieval, one per line.
pub static MULTI_QUERY: PromptTemplate = PromptTemplate::new(
    "multi-query",
    r#"Generate {count} different rephrasings of the question below for searching a documentation index.
Vary the terminology and the angle of each rephrasing. Return one rephrasing per line with no numbering.

Question: {question}"#,
    &["question", "count"],
);
