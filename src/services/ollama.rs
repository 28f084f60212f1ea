//! Ollama-backed embedding and generation providers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::services::{EmbeddingProvider, GenerationProvider};
use crate::types::RagError;

/// Shared HTTP client for one Ollama host.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base: Url,
}

impl OllamaClient {
    /// Builds a client for the host at `base`, e.g. `http://localhost:11434`.
    pub fn new(base: Url, user_agent: &str) -> Result<Self, RagError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .use_rustls_tls()
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RagError> {
        self.base
            .join(path)
            .map_err(|err| RagError::Config(format!("bad service endpoint '{path}': {err}")))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// [`EmbeddingProvider`] speaking Ollama's batch `/api/embed` endpoint.
#[derive(Clone)]
pub struct OllamaEmbeddings {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = self.client.endpoint("api/embed")?;
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .http
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(service_err("embedding"))?
            .error_for_status()
            .map_err(service_err("embedding"))?;
        let body: EmbedResponse = response.json().await.map_err(service_err("embedding"))?;
        if body.embeddings.len() != texts.len() {
            return Err(RagError::service(
                "embedding",
                format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    body.embeddings.len()
                ),
            ));
        }
        debug!(batch = texts.len(), model = %self.model, "embedded batch");
        Ok(body.embeddings)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`GenerationProvider`] speaking Ollama's non-streaming `/api/generate`.
#[derive(Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let endpoint = self.client.endpoint("api/generate")?;
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let response = self
            .client
            .http
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(service_err("generation"))?
            .error_for_status()
            .map_err(service_err("generation"))?;
        let body: GenerateResponse = response.json().await.map_err(service_err("generation"))?;
        debug!(model = %self.model, chars = body.response.len(), "generation complete");
        Ok(body.response)
    }
}

fn service_err(service: &'static str) -> impl Fn(reqwest::Error) -> RagError {
    move |err| RagError::service(service, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn embed_batch_round_trips() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#);
            })
            .await;

        let client = OllamaClient::new(server.base_url().parse().unwrap(), "test-agent").unwrap();
        let provider = OllamaEmbeddings::new(client, "test-embed");
        let vectors = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn embedding_count_mismatch_is_a_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"embeddings": [[0.1]]}"#);
            })
            .await;

        let client = OllamaClient::new(server.base_url().parse().unwrap(), "test-agent").unwrap();
        let provider = OllamaEmbeddings::new(client, "test-embed");
        let err = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Service { service, .. } if service == "embedding"));
    }

    #[tokio::test]
    async fn generate_unwraps_the_response_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"response": "an answer"}"#);
            })
            .await;

        let client = OllamaClient::new(server.base_url().parse().unwrap(), "test-agent").unwrap();
        let generator = OllamaGenerator::new(client, "test-llm", 0.05);
        let text = generator.generate("a prompt").await.unwrap();
        assert_eq!(text, "an answer");
    }

    #[tokio::test]
    async fn http_failure_becomes_a_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500);
            })
            .await;

        let client = OllamaClient::new(server.base_url().parse().unwrap(), "test-agent").unwrap();
        let generator = OllamaGenerator::new(client, "test-llm", 0.05);
        let err = generator.generate("a prompt").await.unwrap_err();
        assert!(matches!(err, RagError::Service { service, .. } if service == "generation"));
    }
}
