//! Embedding cache
//!
//! Keeps recently computed embeddings in a moka future cache so repeated
//! texts (the question embedded by both the retriever and the exporter, a
//! re-indexed document whose chunks did not change) are not sent to the
//! embedding service again.
//!
//! Author: hephaex@gmail.com

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assistant_core::{AssistantError, Result};
use assistant_vector::EmbeddingClient;
use async_trait::async_trait;
use moka::future::Cache;

/// Maximum number of cached embeddings (~6KB each at 1536 x f32)
const MAX_CAPACITY: u64 = 10_000;

/// Time-to-live of a cached embedding
const TTL: Duration = Duration::from_secs(3600);

// ============================================================================
// Embedding Cache
// ============================================================================

/// Cache for text embeddings.
///
/// Thread-safe and suitable for async contexts; clones share the same
/// entries and statistics.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CAPACITY)
            .time_to_live(TTL)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Cached embedding of `text`, if any
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(&hash_text(text)).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    /// Store the embedding of `text`
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        self.cache.insert(hash_text(text), embedding).await;
        self.stats.record_write();
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Caching Embedding Client
// ============================================================================

/// Embedding client that answers repeated texts from an [`EmbeddingCache`]
pub struct CachedEmbedding<E> {
    inner: E,
    cache: EmbeddingCache,
}

impl<E: EmbeddingClient> CachedEmbedding<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<E: EmbeddingClient> EmbeddingClient for CachedEmbedding<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text).await {
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.put(text, embedding.clone()).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let hit = self.cache.get(text).await;
            if hit.is_none() {
                missing.push(i);
            }
            slots.push(hit);
        }

        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let computed = self.inner.embed_batch(&batch).await?;
            if computed.len() != batch.len() {
                return Err(AssistantError::UpstreamError(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    computed.len()
                )));
            }

            for (i, embedding) in missing.into_iter().zip(computed) {
                self.cache.put(&texts[i], embedding.clone()).await;
                slots[i] = Some(embedding);
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    AssistantError::UpstreamError("Embedding missing from batch".to_string())
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Hash text to a 64-bit cache key
fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Embeds a text as [len, calls-so-far] and counts texts sent upstream
    struct CountingEmbedder {
        texts_seen: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.texts_seen.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn counting() -> CachedEmbedding<CountingEmbedder> {
        CachedEmbedding::new(CountingEmbedder {
            texts_seen: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_embedding_cache_basic() {
        let cache = EmbeddingCache::new();

        let text = "Hello, world!";
        let embedding = vec![0.1, 0.2, 0.3, 0.4];

        assert!(cache.get(text).await.is_none());
        assert_eq!(cache.stats().misses(), 1);

        cache.put(text, embedding.clone()).await;
        assert_eq!(cache.get(text).await, Some(embedding));
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().writes(), 1);
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = EmbeddingCache::new();
        let stats = cache.stats();
        assert_eq!(stats.hit_rate(), 0.0);

        cache.get("text1").await; // miss
        cache.put("text1", vec![1.0]).await;
        cache.get("text1").await; // hit
        cache.get("text2").await; // miss

        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 2);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_cached_embed_calls_upstream_once() {
        let client = counting();

        let first = client.embed("question").await.unwrap();
        let second = client.embed("question").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.inner.texts_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_batch_only_sends_misses_in_order() {
        let client = counting();
        client.embed("bb").await.unwrap();

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let embeddings = client.embed_batch(&texts).await.unwrap();

        assert_eq!(
            embeddings,
            vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]
        );
        // "bb" came from the cache
        assert_eq!(client.inner.texts_seen.load(Ordering::SeqCst), 3);
        assert_eq!(client.dimension(), 2);
    }

    #[test]
    fn test_hash_text_consistency() {
        assert_eq!(hash_text("consistent text"), hash_text("consistent text"));
        assert_ne!(hash_text("a"), hash_text("b"));
    }
}
