//! Document indexing
//!
//! Chunks loaded documents, embeds the chunks and writes them into the
//! vector store, applying the collection and on-match policies first. The
//! store is only touched once every chunk has been embedded, in a single
//! write, so a failed run leaves it as it was.
//!
//! Author: hephaex@gmail.com

use std::collections::BTreeSet;
use std::sync::Arc;

use assistant_core::{AssistantError, Document, Result, VectorRecord};
use assistant_parser::Chunker;
use assistant_vector::{EmbeddingClient, VectorStore};
use serde::{Deserialize, Serialize};

/// Texts sent per embedding request
const DEFAULT_BATCH_SIZE: usize = 256;

/// What to do with documents whose source is already indexed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMatch {
    /// Refuse to index anything
    #[default]
    Fail,
    /// Skip the already indexed documents
    Ignore,
    /// Delete their records and index them again
    Replace,
}

impl std::str::FromStr for OnMatch {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            _ => Err(AssistantError::InvalidArgument(format!(
                "unknown on-match action '{s}', expected fail, ignore or replace"
            ))),
        }
    }
}

impl std::fmt::Display for OnMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Ignore => write!(f, "ignore"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Allow appending to a collection that already exists
    pub exist_ok: bool,
    pub on_match: OnMatch,
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents handed to the indexer
    pub documents: usize,
    /// Documents skipped because their source was indexed already
    pub skipped: usize,
    /// Sources whose previous records were replaced
    pub replaced: usize,
    /// Chunks written to the store
    pub chunks: usize,
}

/// Writes documents into a vector store
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    chunker: Chunker,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index `documents` according to `options`
    pub async fn index(
        &self,
        mut documents: Vec<Document>,
        options: IndexOptions,
    ) -> Result<IndexReport> {
        if !options.exist_ok && self.store.exists().await? {
            return Err(AssistantError::CollectionExists {
                collection: self.store.collection().to_string(),
                path: self.store.location(),
            });
        }

        let mut report = IndexReport {
            documents: documents.len(),
            ..IndexReport::default()
        };

        let indexed = self.store.sources().await?;
        let matching: BTreeSet<String> = documents
            .iter()
            .map(|d| d.source().to_string())
            .filter(|source| indexed.contains(source))
            .collect();

        let mut replacing = BTreeSet::new();
        if !matching.is_empty() {
            match options.on_match {
                OnMatch::Fail => {
                    return Err(AssistantError::AlreadyIndexed(
                        matching.into_iter().collect(),
                    ));
                }
                OnMatch::Ignore => {
                    documents.retain(|d| !matching.contains(d.source()));
                    report.skipped = report.documents - documents.len();
                }
                OnMatch::Replace => replacing = matching,
            }
        }

        if documents.is_empty() {
            tracing::info!("Nothing to index");
            return Ok(report);
        }

        let records = self.embed_chunks(&documents).await?;
        report.chunks = records.len();

        if replacing.is_empty() {
            self.store.upsert(records).await?;
        } else {
            let removed = self.store.replace_sources(&replacing, records).await?;
            report.replaced = replacing.len();
            tracing::info!(
                sources = replacing.len(),
                records = removed,
                "Replaced records of re-indexed documents"
            );
        }

        tracing::info!(
            documents = documents.len(),
            chunks = report.chunks,
            skipped = report.skipped,
            replaced = report.replaced,
            "Indexed documents"
        );
        Ok(report)
    }

    /// Chunk `documents` and embed every chunk, `batch_size` texts per request
    async fn embed_chunks(&self, documents: &[Document]) -> Result<Vec<VectorRecord>> {
        let chunks = self.chunker.split(documents);
        let mut records: Vec<VectorRecord> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(AssistantError::UpstreamError(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                records.push(chunk.clone().with_embedding(embedding).into_record()?);
            }
            tracing::debug!(embedded = records.len(), total = chunks.len(), "Embedded chunks");
        }

        Ok(records)
    }
}
