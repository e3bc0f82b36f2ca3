//! Assistant Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::DistanceMetric;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector store location
    pub storage: StorageConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// Document chunking
    pub chunking: ChunkingConfig,

    /// Retriever configuration
    pub retrieval: RetrievalConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    /// Load configuration from variables looked up through `var`
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Storage
        if let Some(dir) = var("DOCS_DB_DIRECTORY") {
            config.storage.db_directory = PathBuf::from(dir);
        }
        if let Some(collection) = var("DOCS_DB_COLLECTION") {
            config.storage.collection = collection;
        }

        // LLM
        config.llm.provider = Some(LlmProvider::detect(&var)?);
        config.llm.openai_api_key = var("OPENAI_API_KEY");
        config.llm.openai_base_url = var("OPENAI_BASE_URL");
        config.llm.azure_api_version = var("OPENAI_API_VERSION");
        if let Some(url) = var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        config.llm.model = var("LLM_MODEL");
        config.llm.embedding_model = var("EMBEDDING_MODEL");

        // Logging
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_var_override(env_var)
    }

    /// Merge with variables looked up through `var` (variables take precedence).
    ///
    /// A provider missing from the file is detected exactly as
    /// [`AppConfig::from_env`] would.
    pub fn with_var_override(
        mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_config = Self::from_vars(&var)?;

        // Only override if env values differ from defaults
        if env_config.storage.db_directory != StorageConfig::default().db_directory {
            self.storage.db_directory = env_config.storage.db_directory;
        }
        if env_config.storage.collection != StorageConfig::default().collection {
            self.storage.collection = env_config.storage.collection;
        }
        let explicit_provider = var("LLM_PROVIDER").is_some() || var("OPENAI_API_TYPE").is_some();
        if explicit_provider || self.llm.provider.is_none() {
            self.llm.provider = env_config.llm.provider;
        }
        if env_config.llm.model.is_some() {
            self.llm.model = env_config.llm.model;
        }
        if env_config.llm.embedding_model.is_some() {
            self.llm.embedding_model = env_config.llm.embedding_model;
        }
        if env_config.llm.ollama_url != LlmConfig::default().ollama_url {
            self.llm.ollama_url = env_config.llm.ollama_url;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }

        // Always use env for sensitive values
        if env_config.llm.openai_api_key.is_some() {
            self.llm.openai_api_key = env_config.llm.openai_api_key;
        }
        if env_config.llm.openai_base_url.is_some() {
            self.llm.openai_base_url = env_config.llm.openai_base_url;
        }
        if env_config.llm.azure_api_version.is_some() {
            self.llm.azure_api_version = env_config.llm.azure_api_version;
        }

        Ok(self)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted collections
    pub db_directory: PathBuf,

    /// Collection name
    pub collection: String,

    /// Distance function used for k-NN search
    pub distance: DistanceMetric,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_directory: PathBuf::from("./data/db"),
            collection: "docs".to_string(),
            distance: DistanceMetric::L2,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use; detected from the environment when unset
    pub provider: Option<LlmProvider>,

    /// OpenAI API key (also used for Azure deployments)
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// `api-version` query parameter sent to Azure deployments
    pub azure_api_version: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name; the provider's default when unset
    pub model: Option<String>,

    /// Embedding model name; the provider's default when unset
    pub embedding_model: Option<String>,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Configured provider, or the no-credentials fallback
    pub fn provider(&self) -> LlmProvider {
        self.provider.unwrap_or(LlmProvider::Ollama)
    }

    pub fn chat_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider().default_chat_model())
    }

    pub fn embedding_model(&self) -> &str {
        self.embedding_model
            .as_deref()
            .unwrap_or_else(|| self.provider().default_embedding_model())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            openai_api_key: None,
            openai_base_url: None,
            azure_api_version: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: None,
            embedding_model: None,
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl LlmProvider {
    /// Pick a provider from the variables looked up through `var`.
    ///
    /// `LLM_PROVIDER` wins when set. Otherwise `OPENAI_API_TYPE=azure` selects
    /// Azure, an `OPENAI_API_KEY` selects OpenAI, and anything else falls back
    /// to a local Ollama server.
    pub fn detect(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(provider) = var("LLM_PROVIDER") {
            return provider.parse();
        }
        if var("OPENAI_API_TYPE").is_some_and(|t| t.eq_ignore_ascii_case("azure")) {
            return Ok(Self::Azure);
        }
        if var("OPENAI_API_KEY").is_some() {
            return Ok(Self::OpenAI);
        }
        Ok(Self::Ollama)
    }

    pub fn default_chat_model(self) -> &'static str {
        match self {
            Self::OpenAI | Self::Azure => "gpt-4o-mini",
            Self::Ollama => "llama3",
        }
    }

    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::OpenAI | Self::Azure => "text-embedding-3-small",
            Self::Ollama => "nomic-embed-text",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" | "local" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::Azure => write!(f, "azure"),
        }
    }
}

/// Split a `provider:model` name into its parts.
///
/// `"openai:text-embedding-3-small"` yields the model name and
/// `Some(LlmProvider::OpenAI)`; a bare model name yields `None` for the
/// provider.
pub fn parse_model_name(full_name: &str) -> Result<(String, Option<LlmProvider>), ConfigError> {
    match full_name.split_once(':') {
        Some((provider, name)) if !name.is_empty() => {
            Ok((name.to_string(), Some(provider.parse()?)))
        }
        Some(_) => Err(ConfigError::InvalidValue {
            key: "model".to_string(),
            value: full_name.to_string(),
        }),
        None => Ok((full_name.to_string(), None)),
    }
}

/// Document chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// File extensions picked up when loading a directory
    pub extensions: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            extensions: vec!["html".to_string()],
        }
    }
}

/// How the retriever selects chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Plain k-NN
    #[default]
    Similarity,
    /// k-NN filtered by a minimum relevance score
    SimilarityScoreThreshold,
    /// Maximal marginal relevance re-ranking
    Mmr,
}

impl std::str::FromStr for SearchType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "similarity_score_threshold" | "threshold" => Ok(Self::SimilarityScoreThreshold),
            "mmr" => Ok(Self::Mmr),
            _ => Err(ConfigError::InvalidValue {
                key: "search_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the language model
    pub k: usize,

    /// Selection strategy
    pub search_type: SearchType,

    /// Minimum relevance score (threshold search only)
    pub score_threshold: Option<f32>,

    /// Candidates fetched before MMR re-ranking
    pub fetch_k: usize,

    /// MMR balance: 1.0 = pure relevance, 0.0 = pure diversity
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            search_type: SearchType::Similarity,
            score_threshold: None,
            fetch_k: 20,
            lambda_mult: 0.5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
