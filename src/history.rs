//! Bounded conversation history shared between a caller and the orchestrator.

use serde::{Deserialize, Serialize};

/// Number of turns retained for question condensation.
pub const HISTORY_WINDOW: usize = 3;

/// One completed exchange: what the user asked and what was answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

impl ChatTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Caller-owned history capped at [`HISTORY_WINDOW`] turns.
///
/// The retrieval pipeline only ever reads this; pushing a new turn past the
/// cap drops the oldest one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        if self.turns.len() > HISTORY_WINDOW {
            let excess = self.turns.len() - HISTORY_WINDOW;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

/// Renders turns as the `Human:`/`AI:` transcript the condense prompt expects.
pub fn format_transcript(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAI: {}", turn.user, turn.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}
