//! Assistant Vector - Vector store abstraction
//!
//! Provides the embedding clients and the vector store used for
//! storing and searching document chunk embeddings.

use std::collections::BTreeSet;

use assistant_core::{DistanceMetric, QueryResult, Result, VectorRecord};
use async_trait::async_trait;

pub mod distance;
pub mod embedding;
pub mod local_store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use local_store::LocalVectorStore;

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// The `k` records closest to `vector`, closest first
    async fn query(&self, vector: &[f32], k: usize) -> Result<QueryResult>;

    /// Snapshot of every record in insertion order
    async fn dump(&self) -> Result<Vec<VectorRecord>>;

    /// Distinct sources of the stored records
    async fn sources(&self) -> Result<BTreeSet<String>>;

    /// Delete every record whose source is listed and upsert `records`, as
    /// one write. Returns the number of records removed.
    async fn replace_sources(
        &self,
        sources: &BTreeSet<String>,
        records: Vec<VectorRecord>,
    ) -> Result<usize>;

    /// Number of stored records
    async fn len(&self) -> Result<usize>;

    /// Whether the collection has been persisted at all
    async fn exists(&self) -> Result<bool>;

    /// Distance function used by `query`
    fn metric(&self) -> DistanceMetric;

    /// Collection name
    fn collection(&self) -> &str;

    /// Human-readable location of the collection, for messages
    fn location(&self) -> String;
}
