//! Retriever
//!
//! Embeds a question and asks the vector store for its nearest chunks.
//! Holds no state of its own beyond the collaborators it was built with.

use std::sync::Arc;

use assistant_core::{AssistantError, QueryResult, Result, RetrievalConfig, SearchType};
use assistant_vector::distance::cosine_similarity;
use assistant_vector::{EmbeddingClient, VectorStore};

/// How candidates are selected from the store
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SearchStrategy {
    /// Plain k nearest neighbours
    #[default]
    Similarity,
    /// k nearest neighbours whose relevance score reaches the threshold
    SimilarityScoreThreshold { score_threshold: f32 },
    /// Fetch `fetch_k` neighbours, then re-rank for diversity.
    /// `lambda_mult` 1.0 is pure relevance, 0.0 pure diversity.
    Mmr { fetch_k: usize, lambda_mult: f32 },
}

impl SearchStrategy {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let strategy = match config.search_type {
            SearchType::Similarity => Self::Similarity,
            SearchType::SimilarityScoreThreshold => Self::SimilarityScoreThreshold {
                score_threshold: config.score_threshold.ok_or_else(|| {
                    AssistantError::ConfigError(
                        "similarity_score_threshold search needs a score_threshold".to_string(),
                    )
                })?,
            },
            SearchType::Mmr => Self::Mmr {
                fetch_k: config.fetch_k,
                lambda_mult: config.lambda_mult,
            },
        };
        strategy.validate()?;
        Ok(strategy)
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Self::SimilarityScoreThreshold { score_threshold }
                if !(0.0..=1.0).contains(&score_threshold) =>
            {
                Err(AssistantError::InvalidArgument(format!(
                    "score_threshold must be within [0, 1], got {score_threshold}"
                )))
            }
            Self::Mmr { lambda_mult, .. } if !(0.0..=1.0).contains(&lambda_mult) => {
                Err(AssistantError::InvalidArgument(format!(
                    "lambda_mult must be within [0, 1], got {lambda_mult}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Finds the chunks most relevant to a question
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    strategy: SearchStrategy,
}

impl Retriever {
    /// Similarity retriever over `store`
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            store,
            embedder,
            strategy: SearchStrategy::Similarity,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// The `k` chunks closest to `question`, closest first
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<QueryResult> {
        let (_, results) = self.retrieve_with_embedding(question, k).await?;
        Ok(results)
    }

    /// Like [`Retriever::retrieve`], also returning the question embedding
    /// so callers can reuse it.
    pub async fn retrieve_with_embedding(
        &self,
        question: &str,
        k: usize,
    ) -> Result<(Vec<f32>, QueryResult)> {
        if k == 0 {
            return Err(AssistantError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }
        self.strategy.validate()?;

        let embedding = self.embedder.embed(question).await?;
        let results = self.search(&embedding, k).await?;

        tracing::info!(k, found = results.len(), strategy = ?self.strategy, "Retrieved chunks");
        Ok((embedding, results))
    }

    /// Search with an already computed question embedding
    pub async fn search(&self, embedding: &[f32], k: usize) -> Result<QueryResult> {
        match self.strategy {
            SearchStrategy::Similarity => self.store.query(embedding, k).await,
            SearchStrategy::SimilarityScoreThreshold { score_threshold } => {
                let mut results = self.store.query(embedding, k).await?;
                results.retain(|r| r.score >= score_threshold);
                Ok(results)
            }
            SearchStrategy::Mmr {
                fetch_k,
                lambda_mult,
            } => {
                let candidates = self.store.query(embedding, fetch_k.max(k)).await?;
                Ok(mmr_rerank(embedding, candidates, k, lambda_mult))
            }
        }
    }
}

/// Re-rank candidates by maximal marginal relevance:
/// `lambda * sim(query, doc) - (1 - lambda) * max(sim(doc, selected))`,
/// using cosine similarity. Ties go to the earlier candidate.
pub fn mmr_rerank(query: &[f32], candidates: QueryResult, k: usize, lambda: f32) -> QueryResult {
    let k = k.min(candidates.len());
    let mut remaining: Vec<(f32, _)> = candidates
        .into_iter()
        .map(|c| (cosine_similarity(query, &c.record.embedding), c))
        .collect();
    let mut selected: QueryResult = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, (relevance, candidate)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.record.embedding, &s.record.embedding))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let mmr = lambda * relevance - (1.0 - lambda) * redundancy;
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx).1);
    }

    selected
}
