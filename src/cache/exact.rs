//! Exact-match response cache.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info};

use super::eviction::EvictionPolicy;
use super::origin_latency_ms;
use crate::telemetry;
use crate::types::{
    CacheEntry, CacheInfo, CacheKey, CacheSource, CacheStats, CacheStrategy, InferenceRequest,
    InferenceResponse, UsageMetrics,
};

/// Cache keyed by the request's exact content hash (plus the parameters
/// that change the answer). A hit replays the stored response
/// byte-for-byte.
pub struct ExactCache {
    max_entries: usize,
    policy: EvictionPolicy,
    inner: Mutex<State>,
}

struct State {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ExactCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            policy: EvictionPolicy::Lru,
            inner: Mutex::new(State {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Override the eviction policy (default: LRU).
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Look up a cached response for this request.
    pub fn get(&self, request: &InferenceRequest) -> Option<InferenceResponse> {
        let key = request.cache_key();
        let mut state = self.inner.lock().expect("cache lock poisoned");
        let Some(entry) = state.entries.get_mut(&key) else {
            state.misses += 1;
            return None;
        };
        if entry.is_expired() {
            state.misses += 1;
            return None;
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
                source: Some(CacheSource::Exact),
                similarity_score: Some(1.0),
                tokens_saved,
                latency_saved_ms: entry.origin_latency_ms,
            },
            ..InferenceResponse::new(request.id, entry.response.clone(), entry.model_used.clone())
        };
        state.hits += 1;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "exact").increment(1);
        info!(
            request_id = %request.id,
            cache_key = &key[..16],
            tokens_saved,
            "exact cache hit"
        );
        Some(response)
    }

    /// Store a response under the request's cache key, evicting past
    /// capacity.
    pub fn insert(&self, request: &InferenceRequest, response: &InferenceResponse) {
        let key = request.cache_key();
        let mut entry = CacheEntry::new(
            CacheKey::from_request(request),
            request.text(),
            response.text.clone(),
            CacheStrategy::Exact,
        );
        entry.model_used = response.model_used.clone();
        entry.tokens_prompt = response.usage.prompt_tokens;
        entry.tokens_completion = response.usage.completion_tokens;
        entry.cost_usd = response.usage.cost_usd;
        entry.ttl_seconds = request.cache_ttl_seconds;
        entry.origin_latency_ms = origin_latency_ms(response);

        let mut state = self.inner.lock().expect("cache lock poisoned");
        state.entries.insert(key.clone(), entry);
        debug!(cache_key = &key[..16], request_id = %request.id, "exact cache set");

        while state.entries.len() > self.max_entries {
            let victim = self
                .policy
                .select_victim(state.entries.iter().map(|(k, e)| (k.as_str(), e)))
                .map(str::to_string);
            match victim {
                Some(victim) => {
                    state.entries.remove(&victim);
                    state.evictions += 1;
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "tier" => "exact")
                        .increment(1);
                    debug!(cache_key = &victim[..16.min(victim.len())], "exact cache evicted");
                }
                None => break,
            }
        }
    }

    /// Delete entries matching `pattern` (substring over prompt or
    /// response); `None` clears everything. Returns the deleted count.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        match pattern {
            None => {
                let count = state.entries.len();
                state.entries.clear();
                count
            }
            Some(pattern) => {
                let doomed: Vec<String> = state
                    .entries
                    .iter()
                    .filter(|(_, e)| e.prompt.contains(pattern) || e.response.contains(pattern))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &doomed {
                    state.entries.remove(key);
                }
                doomed.len()
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
}
