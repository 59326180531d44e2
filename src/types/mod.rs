//! Shared value types for the costwise engine

mod batch;
mod cache;
mod cost;
mod request;
mod response;
mod routing;

pub use batch::{BatchMetrics, BatchRequest, BatchState, BatchStrategy};
pub use cache::{
    CacheEntry, CacheKey, CacheStats, CacheStrategy, HierarchyStats, PrefixCacheEntry,
    SemanticCacheConfig,
};
pub use cost::{
    CostAttribution, CostBreakdown, CostDimension, CostDriver, CostMetrics, TrendSummary,
};
pub use request::{
    ChatMessage, GenerationParameters, InferenceRequest, InferenceRequestBuilder, Priority,
    RequestMetadata,
};
pub use response::{CacheInfo, CacheSource, InferenceResponse, UsageMetrics};
pub use routing::{
    ComplexityEstimate, ComplexityFactors, ModelConfig, ModelTier, RoutingDecision,
    RoutingStrategy,
};
