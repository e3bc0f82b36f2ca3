//! Assistant RAG - Retrieval-Augmented Generation pipeline
//!
//! This crate wires the pipeline stages together:
//! - Indexing: chunk, embed and store documents
//! - Retrieval: nearest chunks for a question
//! - Composition: prompt the language model and parse the cited sources
//! - Inspection: export every embedding for external visualisation
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Instant;

use assistant_core::{Answer, AppConfig, LlmClient, QueryResult, Result};
use assistant_vector::{EmbeddingClient, VectorStore};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod composer;
pub mod export;
pub mod ingest;
pub mod llm;
pub mod retriever;

pub use cache::{CacheStats, CachedEmbedding, EmbeddingCache};
pub use composer::{format_docs, parse_answer, AnswerComposer, DEFAULT_TEMPLATE};
pub use export::{write_json, InspectionExporter};
pub use ingest::{IndexOptions, IndexReport, Indexer, OnMatch};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use retriever::{mmr_rerank, Retriever, SearchStrategy};

// ============================================================================
// Pipeline
// ============================================================================

/// Result of answering one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: Answer,

    /// Chunks the answer was composed from, closest first
    pub source_documents: QueryResult,

    /// Embedding of the question, reusable for inspection
    pub question_embedding: Vec<f32>,

    pub processing_time_ms: u64,
}

/// Retriever plus answer composer
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    composer: AnswerComposer,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, composer: AnswerComposer) -> Self {
        Self {
            retriever,
            composer,
        }
    }

    /// Build the pipeline from configuration and its collaborators
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        let strategy = SearchStrategy::from_config(&config.retrieval)?;
        Ok(Self::new(
            Retriever::new(store, embedder).with_strategy(strategy),
            AnswerComposer::new(llm),
        ))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Retrieve `k` chunks for `question` and compose an answer from them
    pub async fn ask(&self, question: &str, k: usize) -> Result<RagResponse> {
        let start_time = Instant::now();
        tracing::info!(k, "RAG query started");

        let (question_embedding, source_documents) =
            self.retriever.retrieve_with_embedding(question, k).await?;
        let answer = self.composer.answer(question, &source_documents).await?;

        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(processing_time_ms, "RAG query finished");

        Ok(RagResponse {
            answer,
            source_documents,
            question_embedding,
            processing_time_ms,
        })
    }
}
