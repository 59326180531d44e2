//! Environment-driven engine settings.
//!
//! [`Settings::from_env`] reads plain upper-case variables (`REDIS_URL`,
//! `BATCH_MIN_SIZE`, ...) with per-field defaults. Unparseable values
//! fall back to the default with a warning rather than failing startup.

use std::env;
use std::fmt::Debug;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{BatchStrategy, RoutingStrategy, SemanticCacheConfig};
use crate::Result;

/// Engine settings, usually loaded from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // External services
    pub redis_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,

    // Batching
    pub batch_min_size: usize,
    pub batch_max_size: usize,
    pub batch_max_wait_ms: u64,
    pub batch_target_latency_p95: u64,
    pub enable_semantic_grouping: bool,
    pub priority_lanes: bool,

    // Caching
    pub semantic_cache_enabled: bool,
    pub cache_similarity_threshold: f64,
    pub cache_max_size: usize,
    pub cache_ttl_seconds: u64,
    pub prefix_cache_enabled: bool,

    // Routing
    pub routing_strategy: RoutingStrategy,
    pub cost_weight: f64,

    // Limits
    pub rate_limit_rpm: u64,

    // API surface (consumed by the out-of-crate HTTP layer)
    pub api_host: String,
    pub api_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            batch_min_size: 4,
            batch_max_size: 64,
            batch_max_wait_ms: 50,
            batch_target_latency_p95: 100,
            enable_semantic_grouping: true,
            priority_lanes: true,
            semantic_cache_enabled: true,
            cache_similarity_threshold: 0.90,
            cache_max_size: 10_000,
            cache_ttl_seconds: 3600,
            prefix_cache_enabled: true,
            routing_strategy: RoutingStrategy::CostOptimal,
            cost_weight: 0.7,
            rate_limit_rpm: 600,
            api_host: "0.0.0.0".into(),
            api_port: 8000,
        }
    }
}

impl Settings {
    /// Load settings from the environment, defaulting field-by-field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            batch_min_size: env_parse("BATCH_MIN_SIZE", defaults.batch_min_size),
            batch_max_size: env_parse("BATCH_MAX_SIZE", defaults.batch_max_size),
            batch_max_wait_ms: env_parse("BATCH_MAX_WAIT_MS", defaults.batch_max_wait_ms),
            batch_target_latency_p95: env_parse(
                "BATCH_TARGET_LATENCY_P95",
                defaults.batch_target_latency_p95,
            ),
            enable_semantic_grouping: env_parse(
                "ENABLE_SEMANTIC_GROUPING",
                defaults.enable_semantic_grouping,
            ),
            priority_lanes: env_parse("PRIORITY_LANES", defaults.priority_lanes),
            semantic_cache_enabled: env_parse(
                "SEMANTIC_CACHE_ENABLED",
                defaults.semantic_cache_enabled,
            ),
            cache_similarity_threshold: env_parse(
                "CACHE_SIMILARITY_THRESHOLD",
                defaults.cache_similarity_threshold,
            ),
            cache_max_size: env_parse("CACHE_MAX_SIZE", defaults.cache_max_size),
            cache_ttl_seconds: env_parse("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            prefix_cache_enabled: env_parse(
                "PREFIX_CACHE_ENABLED",
                defaults.prefix_cache_enabled,
            ),
            routing_strategy: env_parse("ROUTING_STRATEGY", defaults.routing_strategy),
            cost_weight: env_parse("COST_WEIGHT", defaults.cost_weight).clamp(0.0, 1.0),
            rate_limit_rpm: env_parse("RATE_LIMIT_RPM", defaults.rate_limit_rpm),
            api_host: env_or("API_HOST", defaults.api_host),
            api_port: env_parse("API_PORT", defaults.api_port),
        }
    }

    /// Batching strategy derived from these settings.
    pub fn batch_strategy(&self) -> Result<BatchStrategy> {
        Ok(BatchStrategy::new(self.batch_min_size, self.batch_max_size)?
            .max_wait_ms(self.batch_max_wait_ms)
            .target_latency_p95_ms(self.batch_target_latency_p95)
            .similarity_threshold(self.cache_similarity_threshold)
            .semantic_grouping(self.enable_semantic_grouping)
            .priority_lanes(self.priority_lanes))
    }

    /// Semantic cache configuration derived from these settings.
    pub fn semantic_cache_config(&self) -> SemanticCacheConfig {
        SemanticCacheConfig {
            enabled: self.semantic_cache_enabled,
            similarity_threshold: self.cache_similarity_threshold,
            max_cache_size: self.cache_max_size,
            ..SemanticCacheConfig::default()
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw, ?default, "unparseable setting, using default");
                default
            }
        },
        Err(_) => default,
    }
}
