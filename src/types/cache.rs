//! Cache entry types shared by the cache tiers

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::request::{short_hash, InferenceRequest};

/// Cache storage strategies (variant tag on entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    Exact,
    Semantic,
    Prefix,
}

/// Composite cache key: content hash + the parameters that change the
/// answer (model, temperature, max_tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub content_hash: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CacheKey {
    pub fn from_request(request: &InferenceRequest) -> Self {
        Self {
            content_hash: short_hash(&request.text()),
            model: request
                .preferred_model
                .clone()
                .unwrap_or_else(|| "default".into()),
            temperature: request.parameters.temperature,
            max_tokens: request.parameters.max_tokens,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.content_hash, self.model, self.temperature, self.max_tokens
        )
    }
}

/// Entry in the exact or semantic cache.
///
/// Conceptually immutable once created; the only mutation path is
/// [`touch`](CacheEntry::touch), which updates the access bookkeeping the
/// eviction policies read. Entries are owned by the cache that created
/// them and destroyed on eviction or invalidation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: Uuid,
    pub key: CacheKey,

    // Content
    pub prompt: String,
    pub response: String,
    pub embedding: Option<Vec<f32>>,

    // Metadata
    pub model_used: String,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub cost_usd: f64,

    // Cache management
    pub strategy: CacheStrategy,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    pub ttl_seconds: Option<u64>,

    // Quality
    pub confidence_score: f64,

    /// Measured latency of the dispatch that produced this entry; reported
    /// as `latency_saved_ms` on hits.
    pub origin_latency_ms: u64,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        prompt: impl Into<String>,
        response: impl Into<String>,
        strategy: CacheStrategy,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            key,
            prompt: prompt.into(),
            response: response.into(),
            embedding: None,
            model_used: String::new(),
            tokens_prompt: 0,
            tokens_completion: 0,
            cost_usd: 0.0,
            strategy,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl_seconds: None,
            confidence_score: 1.0,
            origin_latency_ms: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl_seconds {
            Some(ttl) => self.age_seconds() > ttl as f64,
            None => false,
        }
    }

    pub fn age_seconds(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    pub fn seconds_since_access(&self) -> f64 {
        self.last_accessed.elapsed().as_secs_f64()
    }

    /// Total dollars this entry has saved so far.
    pub fn cost_savings(&self) -> f64 {
        self.cost_usd * self.access_count as f64
    }

    /// Record an access: bump the counter, refresh the access timestamp.
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}

/// Specialized cache entry for common prompt prefixes.
///
/// `kv_states` is an opaque backend-specific KV-cache reference (e.g. a
/// vLLM block handle), absent when the backend does not export one.
#[derive(Debug, Clone)]
pub struct PrefixCacheEntry {
    pub prefix_hash: String,
    pub prefix_text: String,
    pub prefix_length: usize,
    pub kv_states: Option<serde_json::Value>,
    pub usage_count: u64,
    pub last_used: Instant,
    pub tokens_saved_per_use: u32,
    pub total_tokens_saved: u64,
}

impl PrefixCacheEntry {
    pub fn new(prefix_text: impl Into<String>, kv_states: Option<serde_json::Value>) -> Self {
        let prefix_text = prefix_text.into();
        Self {
            prefix_hash: short_hash(&prefix_text),
            prefix_length: prefix_text.chars().count(),
            tokens_saved_per_use: (prefix_text.len() / 4) as u32,
            prefix_text,
            kv_states,
            usage_count: 0,
            last_used: Instant::now(),
            total_tokens_saved: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
        self.usage_count += 1;
        self.total_tokens_saved += u64::from(self.tokens_saved_per_use);
    }
}

/// Per-tier cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`; 0 when no lookups have happened.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Statistics across the whole hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyStats {
    pub exact: CacheStats,
    pub semantic: CacheStats,
    pub prefix: CacheStats,
}

/// Configuration for the semantic cache tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    pub enabled: bool,
    pub similarity_threshold: f64,
    /// Cosine distance cutoff handed to the vector store search.
    pub max_distance: f64,
    pub vector_dimension: usize,
    pub max_cache_size: usize,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.90,
            max_distance: 0.15,
            vector_dimension: 384,
            max_cache_size: 10_000,
        }
    }
}
