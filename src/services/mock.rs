//! Deterministic in-process service doubles for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::services::{EmbeddingProvider, GenerationProvider};
use crate::types::RagError;

/// Embedding provider that hashes text into a fixed-dimension vector.
///
/// Identical text always embeds identically, different text almost never
/// collides, which is enough for retrieval tests to behave like a real
/// embedding space with exact-match semantics.
pub struct MockEmbeddingProvider {
    dims: usize,
    embedded: Mutex<Vec<String>>,
}

impl MockEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            embedded: Mutex::new(Vec::new()),
        }
    }

    /// Every text embedded so far, in call order.
    pub fn embedded(&self) -> Vec<String> {
        self.embedded.lock().expect("mock mutex poisoned").clone()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..self.dims)
            .map(|i| {
                let bits = seed.rotate_left((i % 8 * 8) as u32) ^ ((i as u64) << 17);
                (bits as f32) / u64::MAX as f32
            })
            .collect()
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut log = self.embedded.lock().expect("mock mutex poisoned");
        log.extend(texts.iter().cloned());
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// Generation provider replaying a queue of canned replies.
///
/// Prompts are recorded so tests can assert which pipeline stages ran and
/// with what input. When the queue runs dry the `fallback` reply is
/// returned.
pub struct MockGenerationProvider {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fallback: String,
}

impl MockGenerationProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            fallback: "mock reply".to_string(),
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        {
            let mut queue = provider.replies.lock().expect("mock mutex poisoned");
            queue.extend(replies.into_iter().map(Into::into));
        }
        provider
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("mock mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("mock mutex poisoned").len()
    }
}

impl Default for MockGenerationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        self.prompts
            .lock()
            .expect("mock mutex poisoned")
            .push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .expect("mock mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(reply)
    }
}
