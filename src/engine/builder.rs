//! Builder wiring the engine's subsystems together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{Engine, EngineInner};
use crate::backend::{
    BackendPool, CachingEmbedder, Embedder, EmbedderCacheConfig, InMemoryKeyValueStore,
    KeyValueStore, ModelBackend, RateLimiter, VectorStore,
};
use crate::batch::{AdaptiveBatcher, Batcher, BatcherKind, PriorityBatcher, SemanticBatcher};
use crate::cache::{CacheHierarchy, ExactCache, PrefixCache, SemanticCache};
use crate::config::Settings;
use crate::cost::CostCalculator;
use crate::route::{CircuitBreakerRegistry, CostAwareRouter, LoadBalancedRouter, Router};
use crate::types::{BatchStrategy, ModelConfig, RoutingStrategy};
use crate::{CostwiseError, Result};

/// Default capacity of the prefix cache.
const PREFIX_CACHE_ENTRIES: usize = 1_000;

/// Cost weight used for the `balanced` routing preset.
const BALANCED_COST_WEIGHT: f64 = 0.5;

/// Cost weight used for the `latency_optimal` preset (quality-leaning,
/// so faster premium capacity wins more often).
const LATENCY_COST_WEIGHT: f64 = 0.3;

/// Builder for [`Engine`].
///
/// ```rust,ignore
/// let engine = Engine::builder()
///     .settings(Settings::from_env())
///     .model(ModelConfig::new("gpt-3.5", "GPT-3.5", ModelTier::Economy, 4096))
///     .backend(Arc::new(my_backend))
///     .build()?;
/// engine.start();
/// ```
pub struct EngineBuilder {
    settings: Settings,
    strategy: Option<BatchStrategy>,
    batcher_kind: BatcherKind,
    models: Vec<ModelConfig>,
    backends: Vec<Arc<dyn ModelBackend>>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    kv_store: Option<Arc<dyn KeyValueStore>>,
    rate_limiting: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            strategy: None,
            batcher_kind: BatcherKind::Adaptive,
            models: Vec::new(),
            backends: Vec::new(),
            embedder: None,
            vector_store: None,
            kv_store: None,
            rate_limiting: true,
        }
    }

    /// Use these settings (defaults otherwise).
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the batch strategy derived from settings.
    pub fn batch_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Select the batcher variant (default: adaptive).
    pub fn batcher(mut self, kind: BatcherKind) -> Self {
        self.batcher_kind = kind;
        self
    }

    /// Register a model's configuration. Call in routing-preference
    /// order: scoring ties resolve to the earlier model.
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.models.push(model);
        self
    }

    /// Register a backend serving one of the configured models.
    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Provide the embedding provider (enables the semantic cache and
    /// the semantic batcher).
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Provide the vector store backing the semantic cache.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Provide the key-value store backing rate limits and locks
    /// (defaults to in-memory).
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    /// Enable or disable rate limiting (default: enabled).
    pub fn rate_limiting(mut self, enabled: bool) -> Self {
        self.rate_limiting = enabled;
        self
    }

    /// Wire everything and build the engine.
    ///
    /// Construction order matters and is fixed: caches, then router,
    /// then batchers, then backend lanes. Fails when no backend is
    /// registered, a backend has no matching model config, or the
    /// semantic batcher is requested without an embedder.
    pub fn build(self) -> Result<Engine> {
        if self.backends.is_empty() {
            return Err(CostwiseError::Configuration(
                "at least one model backend is required".into(),
            ));
        }
        for backend in &self.backends {
            if !self.models.iter().any(|m| m.id == backend.model_id()) {
                return Err(CostwiseError::Configuration(format!(
                    "backend '{}' has no matching model config",
                    backend.model_id()
                )));
            }
        }

        let strategy = match self.strategy {
            Some(s) => s,
            None => self.settings.batch_strategy()?,
        };

        let embedder: Option<Arc<dyn Embedder>> = self.embedder.map(|e| {
            Arc::new(CachingEmbedder::new(e, EmbedderCacheConfig::default()))
                as Arc<dyn Embedder>
        });

        // Caches first.
        let exact = ExactCache::new(self.settings.cache_max_size);
        let semantic = match (&embedder, &self.vector_store) {
            (Some(embedder), Some(store)) if self.settings.semantic_cache_enabled => {
                Some(SemanticCache::new(
                    self.settings.semantic_cache_config(),
                    embedder.clone(),
                    store.clone(),
                ))
            }
            _ => None,
        };
        let prefix = self
            .settings
            .prefix_cache_enabled
            .then(|| PrefixCache::new(PREFIX_CACHE_ENTRIES));
        let caches = CacheHierarchy::new(exact, semantic, prefix);

        // Router next.
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let router: Arc<dyn Router> = match self.settings.routing_strategy {
            RoutingStrategy::RoundRobin => {
                Arc::new(LoadBalancedRouter::new(self.models.clone(), breakers.clone()))
            }
            RoutingStrategy::CostOptimal => Arc::new(CostAwareRouter::new(
                self.models.clone(),
                self.settings.cost_weight,
                breakers.clone(),
            )),
            RoutingStrategy::Balanced => Arc::new(
                CostAwareRouter::new(self.models.clone(), BALANCED_COST_WEIGHT, breakers.clone())
                    .strategy(RoutingStrategy::Balanced),
            ),
            RoutingStrategy::LatencyOptimal => Arc::new(
                CostAwareRouter::new(self.models.clone(), LATENCY_COST_WEIGHT, breakers.clone())
                    .strategy(RoutingStrategy::LatencyOptimal),
            ),
        };

        // Batchers (one per lane), then backend lanes.
        let mut backends = BackendPool::new();
        let mut lanes = HashMap::new();
        for backend in self.backends {
            let model_id = backend.model_id().to_string();
            let batcher: Arc<dyn Batcher> = match self.batcher_kind {
                BatcherKind::Adaptive => Arc::new(AdaptiveBatcher::new(strategy.clone())),
                BatcherKind::Priority => Arc::new(PriorityBatcher::new(strategy.clone())),
                BatcherKind::Semantic => {
                    let embedder = embedder.clone().ok_or_else(|| {
                        CostwiseError::Configuration(
                            "semantic batching requires an embedder".into(),
                        )
                    })?;
                    Arc::new(SemanticBatcher::new(strategy.clone(), embedder))
                }
            };
            lanes.insert(model_id.clone(), EngineInner::make_lane(model_id, batcher));
            backends.register(backend);
        }

        let rate_limiter = self.rate_limiting.then(|| {
            let store = self
                .kv_store
                .unwrap_or_else(|| Arc::new(InMemoryKeyValueStore::new()));
            RateLimiter::new(store, self.settings.rate_limit_rpm)
        });

        // The drain loop must tick at least as often as the tightest
        // deadline it enforces.
        let poll_ms = strategy
            .express_max_wait_ms
            .min((strategy.max_wait_ms / 2).max(1))
            .max(1);

        let inner = EngineInner::new(
            caches,
            router,
            breakers,
            backends,
            lanes,
            CostCalculator::new(),
            rate_limiter,
            Duration::from_millis(poll_ms),
        );
        Ok(Engine::from_inner(Arc::new(inner)))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
