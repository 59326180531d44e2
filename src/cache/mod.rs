//! Tiered cache hierarchy.
//!
//! Three tiers probed in order — exact match, semantic similarity,
//! prompt prefix — with the first hit short-circuiting. Exact and
//! semantic hits are full responses; a prefix hit is only a batching
//! hint (the backend can reuse KV state for the shared prefix, but still
//! has to generate).
//!
//! Each tier owns its own entry map and mutates it only through its own
//! `get`/`insert`/`invalidate`; the hierarchy adds probe-order policy,
//! probe timing, and error swallowing (a cache failure is never
//! user-visible — it degrades to a miss).

mod eviction;
mod exact;
mod prefix;
mod semantic;

pub use eviction::EvictionPolicy;
pub use exact::ExactCache;
pub use prefix::PrefixCache;
pub use semantic::SemanticCache;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::telemetry;
use crate::types::{HierarchyStats, InferenceRequest, InferenceResponse};

/// Fallback for `latency_saved_ms` when the originating dispatch latency
/// was not recorded (nominal backend latency).
const DEFAULT_LATENCY_SAVED_MS: u64 = 500;

/// Measured latency to report as saved on a future hit on `response`.
pub(crate) fn origin_latency_ms(response: &InferenceResponse) -> u64 {
    if response.inference_time_ms > 0 {
        response.inference_time_ms
    } else if response.latency_ms > 0 {
        response.latency_ms
    } else {
        DEFAULT_LATENCY_SAVED_MS
    }
}

/// Outcome of a hierarchy probe.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Full response available; return it to the caller.
    Hit(InferenceResponse),
    /// No full response, but the request shares this stored prefix — pass
    /// it to the batcher as a `common_prefix` hint.
    PrefixHint(String),
    Miss,
}

/// The tiered cache: exact → semantic → prefix.
pub struct CacheHierarchy {
    exact: ExactCache,
    semantic: Option<SemanticCache>,
    prefix: Option<PrefixCache>,
}

impl CacheHierarchy {
    pub fn new(
        exact: ExactCache,
        semantic: Option<SemanticCache>,
        prefix: Option<PrefixCache>,
    ) -> Self {
        Self {
            exact,
            semantic,
            prefix,
        }
    }

    /// Probe the tiers in order. The returned response's `latency_ms` is
    /// the measured probe time. Tier errors are logged and degrade to a
    /// miss.
    pub async fn get(&self, request: &InferenceRequest) -> CacheLookup {
        let probe_start = Instant::now();

        if let Some(mut response) = self.exact.get(request) {
            response.latency_ms = probe_start.elapsed().as_millis() as u64;
            return CacheLookup::Hit(response);
        }

        if let Some(semantic) = &self.semantic {
            match semantic.get(request).await {
                Ok(Some(mut response)) => {
                    response.latency_ms = probe_start.elapsed().as_millis() as u64;
                    return CacheLookup::Hit(response);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "semantic cache probe failed, treating as miss"),
            }
        }

        if let Some(prefix) = &self.prefix {
            if let Some(entry) = prefix.get_prefix(&request.text()) {
                info!(
                    request_id = %request.id,
                    prefix_length = entry.prefix_length,
                    "prefix cache hit"
                );
                return CacheLookup::PrefixHint(entry.prefix_text);
            }
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(request_id = %request.id, "cache miss");
        CacheLookup::Miss
    }

    /// Store a response in every eligible tier. Errors are logged and
    /// swallowed.
    pub async fn insert(&self, request: &InferenceRequest, response: &InferenceResponse) {
        self.exact.insert(request, response);
        if let Some(semantic) = &self.semantic {
            if let Err(e) = semantic.insert(request, response).await {
                warn!(error = %e, "semantic cache insert failed");
            }
        }
        debug!(request_id = %request.id, "cache set complete");
    }

    /// Record a shared prompt prefix for KV reuse.
    pub fn insert_prefix(&self, prefix_text: &str, kv_states: Option<serde_json::Value>) {
        if let Some(prefix) = &self.prefix {
            prefix.set_prefix(prefix_text, kv_states);
        }
    }

    /// Invalidate across all tiers, returning the total deleted count.
    pub async fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut count = self.exact.invalidate(pattern);
        if let Some(semantic) = &self.semantic {
            match semantic.invalidate(pattern).await {
                Ok(n) => count += n,
                Err(e) => warn!(error = %e, "semantic cache invalidation failed"),
            }
        }
        if let Some(prefix) = &self.prefix {
            count += prefix.invalidate(pattern);
        }
        info!(?pattern, count, "cache invalidated");
        count
    }

    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            exact: self.exact.stats(),
            semantic: self
                .semantic
                .as_ref()
                .map(|c| c.stats())
                .unwrap_or_default(),
            prefix: self.prefix.as_ref().map(|c| c.stats()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UsageMetrics;

    fn hierarchy() -> CacheHierarchy {
        CacheHierarchy::new(ExactCache::new(100), None, Some(PrefixCache::new(100)))
    }

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest::builder().prompt(prompt).build().unwrap()
    }

    fn response(request: &InferenceRequest, text: &str) -> InferenceResponse {
        let mut r = InferenceResponse::new(request.id, text, "test-model");
        r.usage = UsageMetrics {
            prompt_tokens: 4,
            completion_tokens: 6,
            total_tokens: 10,
            cached_tokens: 0,
            cost_usd: 0.001,
        };
        r
    }

    #[tokio::test]
    async fn exact_hit_short_circuits() {
        let caches = hierarchy();
        let req = request("What is machine learning?");
        caches.insert(&req, &response(&req, "A subset of AI.")).await;

        match caches.get(&req).await {
            CacheLookup::Hit(hit) => {
                assert!(hit.cache_info.hit);
                assert_eq!(hit.text, "A subset of AI.");
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prefix_hit_is_a_hint_not_a_response() {
        let caches = hierarchy();
        caches.insert_prefix("You are a helpful assistant.", None);

        let req = request("You are a helpful assistant. Explain monads.");
        match caches.get(&req).await {
            CacheLookup::PrefixHint(prefix) => {
                assert_eq!(prefix, "You are a helpful assistant.");
            }
            other => panic!("expected prefix hint, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn miss_when_nothing_matches() {
        let caches = hierarchy();
        assert!(matches!(
            caches.get(&request("unseen")).await,
            CacheLookup::Miss
        ));
    }

    #[tokio::test]
    async fn invalidate_sums_across_tiers() {
        let caches = hierarchy();
        let req = request("What is Rust?");
        caches.insert(&req, &response(&req, "A language.")).await;
        caches.insert_prefix("What is Rust? Some long prefix here", None);

        let deleted = caches.invalidate(Some("Rust")).await;
        assert_eq!(deleted, 2);
        assert!(matches!(caches.get(&req).await, CacheLookup::Miss));
    }
}
