//! Embedding provider contract and memoizing decorator.
//!
//! [`Embedder`] maps text to a unit-norm vector of the configured
//! dimension. [`CachingEmbedder`] wraps any provider with a moka cache so
//! identical text is embedded once — the semantic cache and the semantic
//! batcher both embed every request they see, and they frequently see the
//! same text.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::telemetry;
use crate::Result;

/// Maps text to a unit-norm embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`. The returned vector must be unit-norm and of
    /// [`dimension`](Embedder::dimension) length.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimensionality. Default: 384.
    fn dimension(&self) -> usize {
        384
    }
}

/// Configuration for the embedding memoization cache.
#[derive(Debug, Clone)]
pub struct EmbedderCacheConfig {
    /// Maximum number of cached embeddings. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached embeddings. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for EmbedderCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Decorator that memoizes an [`Embedder`] through a moka async cache.
///
/// Keyed on a content hash of the input text. The hash is process-local
/// (SipHash), which is sufficient for an in-memory cache.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<u64, Vec<f32>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, config: EmbedderCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = text_key(text);
        if let Some(embedding) = self.cache.get(&key).await {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "embedding").increment(1);
            return Ok(embedding);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.insert(key, embedding.clone()).await;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

fn text_key(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn repeated_text_is_embedded_once() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let embedder = CachingEmbedder::new(inner.clone(), EmbedderCacheConfig::default());

        embedder.embed("hello").await.unwrap();
        embedder.embed("hello").await.unwrap();
        embedder.embed("world").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dimension_is_delegated() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let embedder = CachingEmbedder::new(inner, EmbedderCacheConfig::default());
        assert_eq!(embedder.dimension(), 2);
    }
}
