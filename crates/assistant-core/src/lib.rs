//! Assistant Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the assistant:
//! - Documents, chunks and persisted vector records
//! - Query results, answers and inspection rows
//! - Common error types
//! - Shared traits for language model backends
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ChunkingConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig,
    RetrievalConfig, SearchType, StorageConfig,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for assistant operations
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Bad chunking parameters, missing credentials, unusable config values
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Bad query parameters
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedder or language model call failed
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Persistence read/write failure
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error(
        "Some of the given documents are indexed already: '{}'. Use the 'ignore' or \
         'replace' on-match action to skip or re-index them",
        .0.join("', '")
    )]
    AlreadyIndexed(Vec<String>),

    #[error("Collection '{collection}' already exists in the vector store at '{path}'")]
    CollectionExists { collection: String, path: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;

impl From<ConfigError> for AssistantError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// Metadata attached to a loaded document
///
/// `source` and `page` are the recognised fields; anything else a loader
/// wants to keep (title, language, ...) goes into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Where the document came from (file path)
    pub source: String,

    /// Page number (paged formats only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Additional loader-specific fields
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Create metadata for a source
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set page number
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Add an extension field
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A raw ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Extracted text content
    pub text: String,

    /// Source metadata
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a new document
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Source identifier of this document
    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

// ============================================================================
// Chunk and Record Models
// ============================================================================

/// Metadata of a chunk: the document metadata plus the chunk's offset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Character offset of the chunk within the document text
    pub start_index: usize,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChunkMetadata {
    /// Derive chunk metadata from the owning document's metadata
    pub fn from_document(metadata: &DocumentMetadata, start_index: usize) -> Self {
        Self {
            source: metadata.source.clone(),
            page: metadata.page,
            start_index,
            extra: metadata.extra.clone(),
        }
    }
}

/// A bounded substring of a document, retrievable on its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable hash of `metadata`
    pub id: String,

    /// Text content
    pub text: String,

    /// Source, page and offset
    pub metadata: ChunkMetadata,

    /// Embedding, once computed
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a chunk; the id is derived from the metadata
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: stable_hash(&metadata),
            text: text.into(),
            metadata,
            embedding: None,
        }
    }

    /// Attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Convert into a persisted record. Fails if no embedding was attached.
    pub fn into_record(self) -> Result<VectorRecord> {
        let embedding = self.embedding.ok_or_else(|| {
            AssistantError::InvalidArgument(format!("chunk {} has no embedding", self.id))
        })?;

        Ok(VectorRecord {
            id: self.id,
            text: self.text,
            metadata: self.metadata,
            embedding,
        })
    }
}

/// Persisted form of a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    /// Source identifier of the record
    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// Deterministic identifier for a chunk, derived from its metadata only.
///
/// The metadata is serialized as JSON with keys in sorted order and hashed
/// with SHA-256, so the same metadata always maps to the same id.
pub fn stable_hash(metadata: &ChunkMetadata) -> String {
    let mut fields: BTreeMap<String, Value> = metadata.extra.clone();
    fields.insert("source".to_string(), Value::from(metadata.source.as_str()));
    fields.insert("start_index".to_string(), Value::from(metadata.start_index));
    if let Some(page) = metadata.page {
        fields.insert("page".to_string(), Value::from(page));
    }

    // Insert in sorted order so the output is canonical whether or not
    // serde_json preserves insertion order.
    let canonical = Value::Object(fields.into_iter().collect()).to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Search and Answer Types
// ============================================================================

/// Supported distance functions for k-NN search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance
    #[default]
    L2,
    /// One minus cosine similarity
    Cosine,
    /// One minus inner product
    Ip,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::Cosine => write!(f, "cosine"),
            Self::Ip => write!(f, "ip"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "ip" | "dot" => Ok(Self::Ip),
            _ => Err(ConfigError::InvalidValue {
                key: "distance".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A stored record paired with its distance to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: VectorRecord,

    /// Distance to the query vector (lower is closer)
    pub distance: f32,

    /// Relevance score derived from the distance (higher is better)
    pub score: f32,
}

/// Ranked k-NN results, most similar first
pub type QueryResult = Vec<ScoredRecord>;

/// Generated answer with the sources it cites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: BTreeSet<String>,
}

/// Kind of row in an inspection export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Question,
    Answer,
    Document,
}

/// One row of the table handed to an external visualizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRow {
    pub id: String,
    pub kind: RowKind,
    pub source: String,
    pub page: Option<u32>,
    pub text: String,
    pub embedding: Vec<f32>,

    /// Euclidean distance to the question embedding
    pub distance_to_question: f32,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(source: &str, start_index: usize) -> ChunkMetadata {
        ChunkMetadata::from_document(&DocumentMetadata::new(source), start_index)
    }

    #[test]
    fn test_stable_hash_deterministic() {
        assert_eq!(
            stable_hash(&metadata("doc1.html", 0)),
            stable_hash(&metadata("doc1.html", 0))
        );
        assert_eq!(stable_hash(&metadata("doc1.html", 0)).len(), 64);
    }

    #[test]
    fn test_stable_hash_depends_on_metadata_only() {
        let a = Chunk::new("first text", metadata("doc1.html", 0));
        let b = Chunk::new("completely different text", metadata("doc1.html", 0));
        let c = Chunk::new("first text", metadata("doc1.html", 800));
        let d = Chunk::new("first text", metadata("doc2.html", 0));

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_ne!(a.id, d.id);
    }

    #[test]
    fn test_stable_hash_extra_key_order_irrelevant() {
        let mut first = metadata("doc1.html", 0);
        first.extra.insert("title".into(), Value::from("Race"));
        first.extra.insert("lang".into(), Value::from("en"));

        let mut second = metadata("doc1.html", 0);
        second.extra.insert("lang".into(), Value::from("en"));
        second.extra.insert("title".into(), Value::from("Race"));

        assert_eq!(stable_hash(&first), stable_hash(&second));
    }

    #[test]
    fn test_chunk_into_record_requires_embedding() {
        let chunk = Chunk::new("text", metadata("doc1.html", 0));
        assert!(matches!(
            chunk.clone().into_record(),
            Err(AssistantError::InvalidArgument(_))
        ));

        let record = chunk.with_embedding(vec![1.0, 2.0]).into_record().unwrap();
        assert_eq!(record.embedding, vec![1.0, 2.0]);
        assert_eq!(record.source(), "doc1.html");
    }

    #[test]
    fn test_metadata_extra_roundtrip() {
        let meta = ChunkMetadata {
            source: "a.pdf".into(),
            page: Some(3),
            start_index: 42,
            extra: BTreeMap::from([("title".to_string(), Value::from("Rules"))]),
        };

        let json = serde_json::to_string(&meta).unwrap();
        let back: ChunkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_distance_metric_parse() {
        assert_eq!("l2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!(
            "Cosine".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Cosine
        );
        assert_eq!("ip".parse::<DistanceMetric>().unwrap(), DistanceMetric::Ip);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_already_indexed_message_lists_sources() {
        let err = AssistantError::AlreadyIndexed(vec!["a.html".into(), "b.html".into()]);
        assert!(err.to_string().contains("'a.html', 'b.html'"));
    }
}
