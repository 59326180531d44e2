//! Model configuration, complexity estimates, and routing decisions

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CostwiseError;

/// Model tiers by capability and cost.
///
/// Ordinal: `Economy < Standard < Premium`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Economy,
    Standard,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Premium => "premium",
            ModelTier::Standard => "standard",
            ModelTier::Economy => "economy",
        }
    }
}

/// Strategies for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    CostOptimal,
    LatencyOptimal,
    Balanced,
    RoundRobin,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::CostOptimal => "cost_optimal",
            RoutingStrategy::LatencyOptimal => "latency_optimal",
            RoutingStrategy::Balanced => "balanced",
            RoutingStrategy::RoundRobin => "round_robin",
        }
    }
}

impl FromStr for RoutingStrategy {
    type Err = CostwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cost_optimal" => Ok(RoutingStrategy::CostOptimal),
            "latency_optimal" => Ok(RoutingStrategy::LatencyOptimal),
            "balanced" => Ok(RoutingStrategy::Balanced),
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            other => Err(CostwiseError::Configuration(format!(
                "unknown routing strategy '{other}'"
            ))),
        }
    }
}

/// Configuration and runtime state for one model backend.
///
/// The health/load fields are mutated only through the router's
/// `update_model_health` / `update_model_load`; readers tolerate staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub tier: ModelTier,

    // Capabilities
    pub max_context_length: u32,
    pub supports_streaming: bool,
    pub supports_batching: bool,

    // Performance characteristics
    pub avg_latency_ms: u64,
    pub max_throughput_rps: u32,

    // Cost (per 1K tokens)
    pub cost_per_1k_input_tokens: f64,
    pub cost_per_1k_output_tokens: f64,

    // Availability
    pub current_load: f64,
    pub healthy: bool,
    pub circuit_breaker_open: bool,
}

impl ModelConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tier: ModelTier,
        max_context_length: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tier,
            max_context_length,
            supports_streaming: true,
            supports_batching: true,
            avg_latency_ms: 500,
            max_throughput_rps: 100,
            cost_per_1k_input_tokens: 0.001,
            cost_per_1k_output_tokens: 0.002,
            current_load: 0.0,
            healthy: true,
            circuit_breaker_open: false,
        }
    }

    pub fn pricing(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.cost_per_1k_input_tokens = input_per_1k;
        self.cost_per_1k_output_tokens = output_per_1k;
        self
    }

    pub fn avg_latency_ms(mut self, ms: u64) -> Self {
        self.avg_latency_ms = ms;
        self
    }

    /// Cost in USD for the given token counts at this model's prices.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input = f64::from(input_tokens) / 1000.0 * self.cost_per_1k_input_tokens;
        let output = f64::from(output_tokens) / 1000.0 * self.cost_per_1k_output_tokens;
        input + output
    }

    /// Whether the model can take traffic right now.
    pub fn is_available(&self) -> bool {
        self.healthy && !self.circuit_breaker_open && self.current_load < 0.95
    }
}

/// Per-factor complexity subscores, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub length: f64,
    pub reasoning: f64,
    pub domain: f64,
    pub context: f64,
    pub output_length: f64,
}

/// Estimated complexity of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    /// Weighted overall score in [0, 1]; higher = more complex.
    pub score: f64,
    pub factors: ComplexityFactors,

    pub input_length: usize,
    pub estimated_reasoning_steps: usize,
    pub requires_context: bool,
    pub domain_specific: bool,
}

impl ComplexityEstimate {
    /// Recommended model tier for this complexity.
    pub fn recommended_tier(&self) -> ModelTier {
        if self.score > 0.7 {
            ModelTier::Premium
        } else if self.score > 0.3 {
            ModelTier::Standard
        } else {
            ModelTier::Economy
        }
    }
}

/// Decision about which model serves a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: Uuid,

    pub selected_model: ModelConfig,
    pub fallback_models: Vec<ModelConfig>,

    pub strategy: RoutingStrategy,
    pub complexity: Option<ComplexityEstimate>,

    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    pub estimated_quality_score: f64,

    pub decision_reason: String,
    pub considered_models: Vec<String>,
}
