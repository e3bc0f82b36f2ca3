//! Inspection export
//!
//! Produces a table of every embedding in the store plus the question and
//! answer embeddings, each with its distance to the question, for an external
//! visualiser to project.

use std::path::Path;

use assistant_core::{Answer, AssistantError, InspectionRow, Result, RowKind};
use assistant_vector::distance::euclidean_distance;
use assistant_vector::{EmbeddingClient, VectorStore};

/// Builds inspection rows from a store snapshot
pub struct InspectionExporter<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingClient,
}

impl<'a> InspectionExporter<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn EmbeddingClient) -> Self {
        Self { store, embedder }
    }

    /// Rows in order: question, answer, then every record in store order
    pub async fn export(&self, question: &str, answer: &Answer) -> Result<Vec<InspectionRow>> {
        let texts = [question.to_string(), answer.text.clone()];
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let [question_embedding, answer_embedding]: [Vec<f32>; 2] =
            embeddings.try_into().map_err(|got: Vec<Vec<f32>>| {
                AssistantError::UpstreamError(format!(
                    "Expected 2 embeddings, got {}",
                    got.len()
                ))
            })?;

        self.rows(question, question_embedding, answer, answer_embedding)
            .await
    }

    /// Same as [`InspectionExporter::export`] with the question embedding
    /// already computed (by the retriever)
    pub async fn export_with_question_embedding(
        &self,
        question: &str,
        question_embedding: Vec<f32>,
        answer: &Answer,
    ) -> Result<Vec<InspectionRow>> {
        let answer_embedding = self.embedder.embed(&answer.text).await?;
        self.rows(question, question_embedding, answer, answer_embedding)
            .await
    }

    async fn rows(
        &self,
        question: &str,
        question_embedding: Vec<f32>,
        answer: &Answer,
        answer_embedding: Vec<f32>,
    ) -> Result<Vec<InspectionRow>> {
        let records = self.store.dump().await?;
        let mut rows = Vec::with_capacity(records.len() + 2);

        let answer_sources = answer.sources.iter().cloned().collect::<Vec<_>>().join(", ");
        let answer_distance = euclidean_distance(&answer_embedding, &question_embedding);

        rows.push(InspectionRow {
            id: "question".to_string(),
            kind: RowKind::Question,
            source: String::new(),
            page: None,
            text: question.to_string(),
            embedding: question_embedding.clone(),
            distance_to_question: 0.0,
        });
        rows.push(InspectionRow {
            id: "answer".to_string(),
            kind: RowKind::Answer,
            source: answer_sources,
            page: None,
            text: answer.text.clone(),
            embedding: answer_embedding,
            distance_to_question: answer_distance,
        });

        for record in records {
            let distance = euclidean_distance(&record.embedding, &question_embedding);
            rows.push(InspectionRow {
                id: record.id,
                kind: RowKind::Document,
                source: record.metadata.source,
                page: record.metadata.page,
                text: record.text,
                embedding: record.embedding,
                distance_to_question: distance,
            });
        }

        tracing::info!(rows = rows.len(), "Built inspection rows");
        Ok(rows)
    }
}

/// Write rows as a JSON array
pub async fn write_json(rows: &[InspectionRow], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(rows)
        .map_err(|e| AssistantError::StorageError(format!("Failed to encode rows: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AssistantError::StorageError(format!("{}: {e}", parent.display())))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| AssistantError::StorageError(format!("{}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), rows = rows.len(), "Wrote inspection rows");
    Ok(())
}
