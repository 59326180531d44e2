//! Semantic similarity cache over a vector store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{debug, info};

use super::eviction::EvictionPolicy;
use super::origin_latency_ms;
use crate::backend::{Embedder, VectorStore};
use crate::telemetry;
use crate::types::{
    CacheEntry, CacheInfo, CacheKey, CacheSource, CacheStats, CacheStrategy, InferenceRequest,
    InferenceResponse, SemanticCacheConfig, UsageMetrics,
};
use crate::Result;

/// How many vector-store candidates a lookup considers.
const SEARCH_TOP_K: usize = 5;

/// Cache that matches requests by embedding similarity.
///
/// A lookup embeds the request text, searches the vector store, and
/// accepts the closest candidate whose similarity (`1 − distance`)
/// clears the configured threshold. The entry map and the vector store
/// are kept consistent: every id present in one is present in the other.
pub struct SemanticCache {
    config: SemanticCacheConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    policy: EvictionPolicy,
    inner: Mutex<State>,
}

struct State {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl SemanticCache {
    pub fn new(
        config: SemanticCacheConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
            policy: EvictionPolicy::Lru,
            inner: Mutex::new(State {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Look up a semantically similar cached response.
    pub async fn get(&self, request: &InferenceRequest) -> Result<Option<InferenceResponse>> {
        if !self.config.enabled {
            self.count_miss();
            return Ok(None);
        }
        let query = self.embedder.embed(&request.text()).await?;
        let hits = self
            .store
            .search(&query, SEARCH_TOP_K, self.config.max_distance)
            .await?;
        let Some(best) = hits.first() else {
            self.count_miss();
            debug!(request_id = %request.id, "semantic cache miss");
            return Ok(None);
        };
        let similarity = 1.0 - best.distance;
        if similarity < self.config.similarity_threshold {
            self.count_miss();
            debug!(
                request_id = %request.id,
                best_similarity = similarity,
                threshold = self.config.similarity_threshold,
                "semantic cache miss below threshold"
            );
            return Ok(None);
        }

        let mut state = self.inner.lock().expect("cache lock poisoned");
        let Some(entry) = state.entries.get_mut(&best.id) else {
            state.misses += 1;
            return Ok(None);
        };
        if entry.is_expired() {
            state.misses += 1;
            return Ok(None);
        }
        entry.touch();

        let tokens_saved = entry.tokens_completion;
        let response = InferenceResponse {
            usage: UsageMetrics {
                prompt_tokens: entry.tokens_prompt,
                completion_tokens: entry.tokens_completion,
                total_tokens: entry.tokens_prompt + entry.tokens_completion,
                cached_tokens: entry.tokens_completion,
                cost_usd: 0.0,
            },
            cache_info: CacheInfo {
                hit: true,
                source: Some(CacheSource::Semantic),
                similarity_score: Some(similarity),
                tokens_saved,
                latency_saved_ms: entry.origin_latency_ms,
            },
            ..InferenceResponse::new(request.id, entry.response.clone(), entry.model_used.clone())
        };
        state.hits += 1;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "semantic").increment(1);
        info!(
            request_id = %request.id,
            entry_id = %best.id,
            similarity,
            tokens_saved,
            "semantic cache hit"
        );
        Ok(Some(response))
    }

    /// Store a response, indexed by its embedding.
    pub async fn insert(
        &self,
        request: &InferenceRequest,
        response: &InferenceResponse,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let text = request.text();
        let embedding = self.embedder.embed(&text).await?;

        let mut entry = CacheEntry::new(
            CacheKey::from_request(request),
            text.clone(),
            response.text.clone(),
            CacheStrategy::Semantic,
        );
        entry.embedding = Some(embedding.clone());
        entry.model_used = response.model_used.clone();
        entry.tokens_prompt = response.usage.prompt_tokens;
        entry.tokens_completion = response.usage.completion_tokens;
        entry.cost_usd = response.usage.cost_usd;
        entry.ttl_seconds = request.cache_ttl_seconds;
        entry.origin_latency_ms = origin_latency_ms(response);
        let entry_id = entry.id.to_string();

        {
            let mut state = self.inner.lock().expect("cache lock poisoned");
            state.entries.insert(entry_id.clone(), entry);
        }
        self.store
            .add(
                &entry_id,
                embedding,
                json!({
                    "prompt": text,
                    "model": response.model_used,
                }),
            )
            .await?;
        debug!(entry_id, request_id = %request.id, "semantic cache set");

        // Evict past capacity, keeping map and store in lockstep.
        loop {
            let victim = {
                let mut state = self.inner.lock().expect("cache lock poisoned");
                if state.entries.len() <= self.config.max_cache_size {
                    break;
                }
                let victim = self
                    .policy
                    .select_victim(state.entries.iter().map(|(k, e)| (k.as_str(), e)))
                    .map(str::to_string);
                if let Some(id) = &victim {
                    state.entries.remove(id);
                    state.evictions += 1;
                }
                victim
            };
            match victim {
                Some(id) => {
                    self.store.delete(&id).await?;
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "tier" => "semantic")
                        .increment(1);
                    debug!(entry_id = id, "semantic cache evicted");
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Delete entries matching `pattern`; `None` clears everything.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        match pattern {
            None => {
                let count = {
                    let mut state = self.inner.lock().expect("cache lock poisoned");
                    let count = state.entries.len();
                    state.entries.clear();
                    count
                };
                self.store.clear().await?;
                Ok(count)
            }
            Some(pattern) => {
                let doomed: Vec<String> = {
                    let mut state = self.inner.lock().expect("cache lock poisoned");
                    let doomed: Vec<String> = state
                        .entries
                        .iter()
                        .filter(|(_, e)| {
                            e.prompt.contains(pattern) || e.response.contains(pattern)
                        })
                        .map(|(k, _)| k.clone())
                        .collect();
                    for id in &doomed {
                        state.entries.remove(id);
                    }
                    doomed
                };
                for id in &doomed {
                    self.store.delete(id).await?;
                }
                Ok(doomed.len())
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn count_miss(&self) {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        state.misses += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Embedder with two fixed directions: "math" prompts and everything
    /// else. Close variants of "math" get a slightly rotated vector.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("2+2") {
                // ~0.995 similarity with the canonical math vector.
                Ok(vec![0.995, 0.0999])
            } else if text.contains("math") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn cache() -> SemanticCache {
        let config = SemanticCacheConfig {
            vector_dimension: 2,
            similarity_threshold: 0.90,
            max_distance: 0.15,
            ..SemanticCacheConfig::default()
        };
        SemanticCache::new(
            config,
            Arc::new(StubEmbedder),
            Arc::new(InMemoryVectorStore::new(2)),
        )
    }

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest::builder().prompt(prompt).build().unwrap()
    }

    fn response(request: &InferenceRequest, text: &str) -> InferenceResponse {
        let mut r = InferenceResponse::new(request.id, text, "test-model");
        r.usage.completion_tokens = 7;
        r.usage.prompt_tokens = 3;
        r.usage.total_tokens = 10;
        r
    }

    #[tokio::test]
    async fn similar_request_hits_above_threshold() {
        let cache = cache();
        let stored = request("a math question");
        cache.insert(&stored, &response(&stored, "42")).await.unwrap();

        let similar = request("what is 2+2 please");
        let hit = cache.get(&similar).await.unwrap().unwrap();
        assert_eq!(hit.text, "42");
        assert_eq!(hit.cache_info.source, Some(CacheSource::Semantic));
        let similarity = hit.cache_info.similarity_score.unwrap();
        assert!(similarity >= 0.90);
        assert!(similarity < 1.0 + 1e-9);
    }

    #[tokio::test]
    async fn dissimilar_request_misses() {
        let cache = cache();
        let stored = request("a math question");
        cache.insert(&stored, &response(&stored, "42")).await.unwrap();

        let other = request("tell me about cooking");
        assert!(cache.get(&other).await.unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn invalidate_all_clears_map_and_store() {
        let config = SemanticCacheConfig {
            vector_dimension: 2,
            ..SemanticCacheConfig::default()
        };
        let store = Arc::new(InMemoryVectorStore::new(2));
        let cache = SemanticCache::new(config, Arc::new(StubEmbedder), store.clone());

        let stored = request("a math question");
        cache.insert(&stored, &response(&stored, "42")).await.unwrap();
        assert_eq!(store.len(), 1);

        assert_eq!(cache.invalidate(None).await.unwrap(), 1);
        assert_eq!(store.len(), 0);
        assert!(cache.get(&request("a math question")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eviction_removes_from_both_sides() {
        let config = SemanticCacheConfig {
            vector_dimension: 2,
            max_cache_size: 1,
            ..SemanticCacheConfig::default()
        };
        let store = Arc::new(InMemoryVectorStore::new(2));
        let cache = SemanticCache::new(config, Arc::new(StubEmbedder), store.clone());

        let a = request("a math question");
        cache.insert(&a, &response(&a, "42")).await.unwrap();
        let b = request("tell me about cooking");
        cache.insert(&b, &response(&b, "stir")).await.unwrap();

        assert_eq!(cache.stats().size, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let config = SemanticCacheConfig {
            enabled: false,
            vector_dimension: 2,
            ..SemanticCacheConfig::default()
        };
        let cache = SemanticCache::new(
            config,
            Arc::new(StubEmbedder),
            Arc::new(InMemoryVectorStore::new(2)),
        );
        let req = request("a math question");
        cache.insert(&req, &response(&req, "42")).await.unwrap();
        assert!(cache.get(&req).await.unwrap().is_none());
    }
}
