//! Inference response, usage, and cache-provenance types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nominal price used to estimate the dollar value of cached tokens
/// when the originating cost is unknown ($0.002 per 1K tokens).
const NOMINAL_TOKEN_PRICE_USD: f64 = 0.002 / 1000.0;

/// Token usage and cost metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cached_tokens: u32,
    pub cost_usd: f64,
}

impl UsageMetrics {
    /// Fraction of tokens served from cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_tokens == 0 {
            0.0
        } else {
            f64::from(self.cached_tokens) / f64::from(self.total_tokens)
        }
    }
}

/// Which cache tier produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Exact,
    Semantic,
    Prefix,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Exact => "exact",
            CacheSource::Semantic => "semantic",
            CacheSource::Prefix => "prefix",
        }
    }
}

/// Information about cache usage for one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub hit: bool,
    pub source: Option<CacheSource>,
    pub similarity_score: Option<f64>,
    pub tokens_saved: u32,
    pub latency_saved_ms: u64,
}

impl CacheInfo {
    /// A plain miss.
    pub fn miss() -> Self {
        Self::default()
    }
}

/// Complete inference response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub id: Uuid,
    pub request_id: Uuid,
    pub text: String,
    pub finish_reason: String,
    pub model_used: String,
    pub usage: UsageMetrics,
    pub cache_info: CacheInfo,
    /// End-to-end latency observed by the engine.
    pub latency_ms: u64,
    pub queue_time_ms: u64,
    pub inference_time_ms: u64,
    pub postprocess_time_ms: u64,
}

impl InferenceResponse {
    pub fn new(request_id: Uuid, text: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            text: text.into(),
            finish_reason: "stop".into(),
            model_used: model_used.into(),
            usage: UsageMetrics::default(),
            cache_info: CacheInfo::miss(),
            latency_ms: 0,
            queue_time_ms: 0,
            inference_time_ms: 0,
            postprocess_time_ms: 0,
        }
    }

    /// Total cost for this request.
    pub fn total_cost_usd(&self) -> f64 {
        self.usage.cost_usd
    }

    /// Estimated dollars avoided by serving this response from cache.
    pub fn cost_saved_usd(&self) -> f64 {
        if !self.cache_info.hit {
            return 0.0;
        }
        f64::from(self.cache_info.tokens_saved) * NOMINAL_TOKEN_PRICE_USD
    }
}
