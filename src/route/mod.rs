//! Routing subsystem.
//!
//! Selects one backend and an ordered alternative list per request. The
//! [`CostAwareRouter`] (default) scores models by a weighted
//! cost/quality/load function gated by a [`ComplexityEstimator`]
//! estimate; the [`LoadBalancedRouter`] round-robins over available
//! models. Both consult the per-model [`CircuitBreakerRegistry`], and the
//! [`FallbackChain`] walks a decision's alternatives during dispatch
//! retries.

mod breaker;
mod complexity;
mod cost_aware;
mod fallback;
mod load_balanced;

pub use breaker::CircuitBreakerRegistry;
pub use complexity::ComplexityEstimator;
pub use cost_aware::CostAwareRouter;
pub use fallback::FallbackChain;
pub use load_balanced::LoadBalancedRouter;

use async_trait::async_trait;

use crate::types::{InferenceRequest, ModelConfig, RoutingDecision};
use crate::Result;

/// Model selection seam.
///
/// Health and load updates are the only mutation paths for model state;
/// concurrent readers tolerate stale values.
#[async_trait]
pub trait Router: Send + Sync {
    /// Select a model (and fallbacks) for this request.
    async fn route(&self, request: &InferenceRequest) -> Result<RoutingDecision>;

    /// Update a model's health and breaker flags.
    fn update_model_health(&self, model_id: &str, healthy: bool, circuit_breaker_open: bool);

    /// Update a model's load fraction (clamped to [0, 1]).
    fn update_model_load(&self, model_id: &str, load: f64);

    /// Snapshot of the configured models.
    fn models(&self) -> Vec<ModelConfig>;
}
