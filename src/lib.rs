//! Costwise - Cost-optimized inference gateway orchestration engine
//!
//! Costwise sits in front of a heterogeneous pool of LLM backends and
//! decides which backend to use, whether an existing answer can be
//! reused, and how to group requests into efficient execution batches —
//! minimizing dollar cost and latency while preserving correctness and
//! fair service. It never generates tokens itself; it orchestrates.
//!
//! Four subsystems do the heavy lifting: an adaptive multi-queue
//! batcher, a tiered cache hierarchy (exact / semantic / prefix), a
//! cost-aware router with circuit breakers, and a cost attribution
//! reporter.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use costwise::{Engine, InferenceRequest, ModelConfig, ModelTier, Settings};
//!
//! #[tokio::main]
//! async fn main() -> costwise::Result<()> {
//!     let engine = Engine::builder()
//!         .settings(Settings::from_env())
//!         .model(ModelConfig::new("gpt-3.5", "GPT-3.5", ModelTier::Economy, 4096)
//!             .pricing(0.0015, 0.002))
//!         .backend(Arc::new(my_openai_backend))
//!         .build()?;
//!     engine.start();
//!
//!     let request = InferenceRequest::builder()
//!         .prompt("What is the capital of France?")
//!         .build()?;
//!     let response = engine.infer(request).await?;
//!     println!("{} (cache hit: {})", response.text, response.cache_info.hit);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod batch;
pub mod cache;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod route;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use backend::{
    BackendPool, CachingEmbedder, ChunkStream, DistributedLock, Embedder, InMemoryKeyValueStore,
    InMemoryVectorStore, KeyValueStore, ModelBackend, RateLimiter, SearchHit, VectorStore,
};
pub use batch::{AdaptiveBatcher, Batcher, BatcherKind, PriorityBatcher, QueueStats, SemanticBatcher};
pub use cache::{CacheHierarchy, CacheLookup, EvictionPolicy, ExactCache, PrefixCache, SemanticCache};
pub use config::Settings;
pub use cost::{CostAttributor, CostCalculator, CostOptimizer};
pub use engine::{Engine, EngineBuilder};
pub use error::{CostwiseError, Result};
pub use route::{
    CircuitBreakerRegistry, ComplexityEstimator, CostAwareRouter, FallbackChain,
    LoadBalancedRouter, Router,
};
pub use types::{
    BatchMetrics, BatchRequest, BatchState, BatchStrategy, CacheEntry, CacheInfo, CacheKey,
    CacheSource, CacheStats, CacheStrategy, ChatMessage, ComplexityEstimate, ComplexityFactors,
    CostAttribution, CostBreakdown, CostDimension, CostDriver, CostMetrics, GenerationParameters,
    HierarchyStats, InferenceRequest, InferenceRequestBuilder, InferenceResponse, ModelConfig,
    ModelTier, PrefixCacheEntry, Priority, RequestMetadata, RoutingDecision, RoutingStrategy,
    SemanticCacheConfig, TrendSummary, UsageMetrics,
};
