//! Embedding client for generating vector representations
//!
//! Supports OpenAI-compatible and Ollama embedding APIs. Any transport or
//! decoding failure surfaces as [`AssistantError::UpstreamError`].
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use assistant_core::{AssistantError, LlmConfig, LlmProvider, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_DEFAULT_API_VERSION: &str = "2024-02-01";

// ============================================================================
// Embedding Trait
// ============================================================================

/// Maps text to a fixed-length vector.
///
/// The same input must map to the same vector for the same model.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

#[async_trait]
impl<T: EmbeddingClient + ?Sized> EmbeddingClient for Box<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AssistantError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

fn upstream(context: &str, err: impl std::fmt::Display) -> AssistantError {
    AssistantError::UpstreamError(format!("{context}: {err}"))
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    /// Set for Azure deployments, which address the model by URL path
    azure_api_version: Option<String>,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536, // text-embedding-3-small, ada-002
        };

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            azure_api_version: None,
            model,
            dimension,
        }
    }

    /// Point the client at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| AssistantError::ConfigError("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.embedding_model());
        client.client = http_client(config.timeout_secs)?;
        if let Some(base_url) = &config.openai_base_url {
            client = client.with_base_url(base_url.clone());
        }

        if config.provider() == LlmProvider::Azure {
            if config.openai_base_url.is_none() {
                return Err(AssistantError::ConfigError(
                    "Azure deployments need OPENAI_BASE_URL (the resource endpoint)".to_string(),
                ));
            }
            client.azure_api_version = Some(
                config
                    .azure_api_version
                    .clone()
                    .unwrap_or_else(|| AZURE_DEFAULT_API_VERSION.to_string()),
            );
        }
        Ok(client)
    }

    fn request(&self) -> reqwest::RequestBuilder {
        match &self.azure_api_version {
            None => self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key),
            Some(api_version) => self
                .client
                .post(format!(
                    "{}/openai/deployments/{}/embeddings",
                    self.base_url, self.model
                ))
                .query(&[("api-version", api_version.as_str())])
                .header("api-key", &self.api_key),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::UpstreamError("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .request()
            .json(&request)
            .send()
            .await
            .map_err(|e| upstream("Embedding request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::UpstreamError(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| upstream("Failed to parse embedding response", e))?;

        if result.data.len() != texts.len() {
            return Err(AssistantError::UpstreamError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        tracing::debug!(count = embeddings.len(), model = %self.model, "Embedded batch");
        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // nomic-embed-text and most others
        };

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.embedding_model());
        client.client = http_client(config.timeout_secs)?;
        Ok(client)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| upstream("Ollama embedding request failed", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::UpstreamError(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| upstream("Failed to parse embedding response", e))?;

        Ok(result.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // No batch endpoint, one request per text
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider() {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Box::new(OpenAiEmbedding::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434/", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig {
            provider: Some(LlmProvider::OpenAI),
            openai_api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_embedding_client(&config),
            Err(AssistantError::ConfigError(_))
        ));
    }

    #[test]
    fn test_openai_base_url_from_config() {
        let config = LlmConfig {
            provider: Some(LlmProvider::OpenAI),
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some("http://localhost:8080/v1/".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.azure_api_version, None);
        assert_eq!(client.model, "text-embedding-3-small");
    }

    #[test]
    fn test_azure_uses_deployment_api_version() {
        let config = LlmConfig {
            provider: Some(LlmProvider::Azure),
            openai_api_key: Some("key".to_string()),
            openai_base_url: Some("https://example.openai.azure.com".to_string()),
            azure_api_version: Some("2024-06-01".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.azure_api_version.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn test_ollama_default_embedding_model() {
        let client = OllamaEmbedding::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(client.model, "nomic-embed-text");
        assert_eq!(client.dimension(), 768);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let client = OllamaEmbedding::new("http://127.0.0.1:1", "nomic-embed-text");
        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, AssistantError::UpstreamError(_)));
    }
}
