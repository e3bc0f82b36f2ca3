//! LLM Client implementations
//!
//! Provides the OpenAI (including Azure deployments and compatible servers)
//! and Ollama completion APIs behind [`LlmClient`].
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use assistant_core::{AssistantError, LlmClient, LlmConfig, LlmProvider, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_DEFAULT_API_VERSION: &str = "2024-02-01";

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AssistantError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// How requests are addressed and authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// `{base}/chat/completions` with a bearer token
    OpenAi,
    /// `{base}/openai/deployments/{model}/chat/completions?api-version=..`
    /// with an `api-key` header
    Azure { api_version: String },
}

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    endpoint: Endpoint,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            endpoint: Endpoint::OpenAi,
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| AssistantError::ConfigError("OpenAI API key required".to_string()))?;

        let mut client = Self::new(
            api_key.clone(),
            config.chat_model(),
            config.max_tokens,
            config.temperature,
        );
        client.client = http_client(config.timeout_secs)?;

        if config.provider() == LlmProvider::Azure {
            let base_url = config.openai_base_url.clone().ok_or_else(|| {
                AssistantError::ConfigError(
                    "Azure deployments need OPENAI_BASE_URL (the resource endpoint)".to_string(),
                )
            })?;
            let api_version = config
                .azure_api_version
                .clone()
                .unwrap_or_else(|| AZURE_DEFAULT_API_VERSION.to_string());
            client = client
                .with_base_url(base_url)
                .with_endpoint(Endpoint::Azure { api_version });
        } else if let Some(base_url) = &config.openai_base_url {
            client = client.with_base_url(base_url.clone());
        }

        Ok(client)
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn request(&self) -> RequestBuilder {
        match &self.endpoint {
            Endpoint::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key),
            Endpoint::Azure { api_version } => self
                .client
                .post(format!(
                    "{}/openai/deployments/{}/chat/completions",
                    self.base_url, self.model
                ))
                .query(&[("api-version", api_version.as_str())])
                .header("api-key", &self.api_key),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .request()
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::UpstreamError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::UpstreamError(format!(
                "OpenAI error ({status}): {error_text}"
            )));
        }

        let result: OpenAiResponse = response.json().await.map_err(|e| {
            AssistantError::UpstreamError(format!("Failed to parse response: {e}"))
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AssistantError::UpstreamError("No response generated".to_string()))
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.chat_model());
        client.client = http_client(config.timeout_secs)?;
        client.temperature = config.temperature;
        Ok(client)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::UpstreamError(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::UpstreamError(format!(
                "Ollama error: {error_text}"
            )));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            AssistantError::UpstreamError(format!("Failed to parse Ollama response: {e}"))
        })?;

        Ok(result.response)
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider() {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Box::new(OpenAiClient::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 2048, 0.1);
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.endpoint, Endpoint::OpenAi);
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3");
        assert_eq!(client.model, "llama3");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_azure_from_config() {
        let config = LlmConfig {
            provider: Some(LlmProvider::Azure),
            openai_api_key: Some("key".to_string()),
            openai_base_url: Some("https://example.openai.azure.com/".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://example.openai.azure.com");
        assert_eq!(
            client.endpoint,
            Endpoint::Azure {
                api_version: AZURE_DEFAULT_API_VERSION.to_string()
            }
        );
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let config = LlmConfig {
            provider: Some(LlmProvider::Azure),
            openai_api_key: Some("key".to_string()),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_llm_client(&config),
            Err(AssistantError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_error() {
        let client = OllamaClient::new("http://127.0.0.1:1", "llama3");
        assert!(matches!(
            client.generate("hi").await,
            Err(AssistantError::UpstreamError(_))
        ));
    }
}
