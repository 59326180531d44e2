//! Cost-aware model selection.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::breaker::CircuitBreakerRegistry;
use super::complexity::ComplexityEstimator;
use super::Router;
use crate::telemetry;
use crate::types::{
    ComplexityEstimate, InferenceRequest, ModelConfig, ModelTier, RoutingDecision,
    RoutingStrategy,
};
use crate::{CostwiseError, Result};

/// Divisor guard for cost normalization when all candidates cost the same.
const COST_EPSILON: f64 = 1e-6;

/// Weight of current load in the selection score.
const LOAD_PENALTY_WEIGHT: f64 = 0.2;

/// Maximum fallbacks attached to a decision.
const MAX_FALLBACKS: usize = 3;

/// Routes requests to the model minimizing a weighted cost/quality/load
/// score, gated by a complexity estimate.
///
/// `cost_weight` ∈ [0, 1]: 1 routes purely by cost, 0 purely by quality.
/// Candidates are scanned in configured order and a strictly smaller
/// score is required to displace the incumbent, so ties resolve to
/// configuration order.
pub struct CostAwareRouter {
    strategy: RoutingStrategy,
    estimator: ComplexityEstimator,
    cost_weight: f64,
    breakers: Arc<CircuitBreakerRegistry>,
    models: RwLock<Vec<ModelConfig>>,
}

impl CostAwareRouter {
    pub fn new(
        models: Vec<ModelConfig>,
        cost_weight: f64,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            strategy: RoutingStrategy::CostOptimal,
            estimator: ComplexityEstimator::new(),
            cost_weight,
            breakers,
            models: RwLock::new(models),
        }
    }

    /// Tag decisions with a different strategy label (used when this
    /// router implements the balanced / latency-leaning presets).
    pub fn strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn can_handle(
        model: &ModelConfig,
        request: &InferenceRequest,
        complexity: &ComplexityEstimate,
    ) -> bool {
        let total_tokens = request.estimated_input_tokens() + request.parameters.max_tokens;
        if total_tokens > model.max_context_length {
            return false;
        }
        // An economy model never takes premium-complexity work.
        !(complexity.recommended_tier() == ModelTier::Premium
            && model.tier == ModelTier::Economy)
    }

    /// Tier quality adjusted toward the recommended tier: +0.1 for
    /// over-provisioning, −0.2 for under-provisioning, clamped to [0, 1].
    fn quality(model: &ModelConfig, complexity: &ComplexityEstimate) -> f64 {
        let base = match model.tier {
            ModelTier::Premium => 1.0,
            ModelTier::Standard => 0.7,
            ModelTier::Economy => 0.4,
        };
        let recommended = complexity.recommended_tier();
        if model.tier == recommended {
            base
        } else if model.tier > recommended {
            (base + 0.1).min(1.0)
        } else {
            (base - 0.2).max(0.0)
        }
    }

    fn score(&self, model: &ModelConfig, normalized_cost: f64, quality: f64) -> f64 {
        self.cost_weight * normalized_cost
            + (1.0 - self.cost_weight) * (1.0 - quality)
            + LOAD_PENALTY_WEIGHT * model.current_load
    }

    fn reason(model: &ModelConfig, complexity: &ComplexityEstimate) -> String {
        let mut parts = vec![
            format!("selected {} ({} tier)", model.name, model.tier.as_str()),
            format!("complexity {:.2}", complexity.score),
            format!("${:.4}/1K input tokens", model.cost_per_1k_input_tokens),
        ];
        if complexity.score < 0.3 {
            parts.push("simple query, economy model sufficient".into());
        } else if complexity.score < 0.7 {
            parts.push("moderate complexity, standard model appropriate".into());
        } else {
            parts.push("high complexity, premium model required".into());
        }
        if model.current_load > 0.7 {
            parts.push(format!("high load ({:.0}%)", model.current_load * 100.0));
        }
        parts.join("; ")
    }
}

#[async_trait]
impl Router for CostAwareRouter {
    async fn route(&self, request: &InferenceRequest) -> Result<RoutingDecision> {
        let complexity = self.estimator.estimate(request);
        let models = self.models.read().expect("router lock poisoned").clone();

        let mut candidates: Vec<&ModelConfig> = models
            .iter()
            .filter(|m| {
                m.is_available()
                    && !self.breakers.is_open(&m.id)
                    && Self::can_handle(m, request, &complexity)
            })
            .collect();
        if candidates.is_empty() {
            // Last resort: any healthy model, capability checks waived.
            candidates = models.iter().filter(|m| m.healthy).collect();
        }
        if candidates.is_empty() {
            return Err(CostwiseError::NoHealthyBackend);
        }

        let min_cost = candidates
            .iter()
            .map(|m| m.cost_per_1k_input_tokens)
            .fold(f64::INFINITY, f64::min);
        let max_cost = candidates
            .iter()
            .map(|m| m.cost_per_1k_input_tokens)
            .fold(f64::NEG_INFINITY, f64::max);

        let scored: Vec<(f64, &ModelConfig)> = candidates
            .iter()
            .map(|&m| {
                let normalized_cost =
                    (m.cost_per_1k_input_tokens - min_cost) / (max_cost - min_cost + COST_EPSILON);
                let quality = Self::quality(m, &complexity);
                (self.score(m, normalized_cost, quality), m)
            })
            .collect();

        // Strict minimum in configured order: ties keep the earlier model.
        let mut best: Option<(f64, &ModelConfig)> = None;
        for &(score, model) in &scored {
            if best.is_none_or(|(b, _)| score < b) {
                best = Some((score, model));
            }
        }
        let selected = best.expect("non-empty candidates").1.clone();

        let mut others: Vec<(f64, &ModelConfig)> = scored
            .iter()
            .filter(|(_, m)| m.id != selected.id)
            .map(|(s, m)| (*s, *m))
            .collect();
        others.sort_by(|a, b| a.0.total_cmp(&b.0));
        let fallbacks: Vec<ModelConfig> = others
            .into_iter()
            .take(MAX_FALLBACKS)
            .map(|(_, m)| m.clone())
            .collect();

        let estimated_cost = selected
            .calculate_cost(request.estimated_input_tokens(), request.parameters.max_tokens);
        let decision = RoutingDecision {
            request_id: request.id,
            estimated_latency_ms: selected.avg_latency_ms,
            estimated_quality_score: Self::quality(&selected, &complexity),
            decision_reason: Self::reason(&selected, &complexity),
            considered_models: candidates.iter().map(|m| m.id.clone()).collect(),
            strategy: self.strategy,
            complexity: Some(complexity),
            estimated_cost,
            fallback_models: fallbacks,
            selected_model: selected,
        };

        metrics::counter!(
            telemetry::ROUTING_DECISIONS_TOTAL,
            "model" => decision.selected_model.id.clone(),
            "strategy" => self.strategy.as_str(),
        )
        .increment(1);
        info!(
            request_id = %request.id,
            model = decision.selected_model.id,
            complexity = decision.complexity.as_ref().map(|c| c.score).unwrap_or(0.0),
            estimated_cost = decision.estimated_cost,
            fallbacks = decision.fallback_models.len(),
            "routing decision"
        );
        Ok(decision)
    }

    fn update_model_health(&self, model_id: &str, healthy: bool, circuit_breaker_open: bool) {
        let mut models = self.models.write().expect("router lock poisoned");
        if let Some(model) = models.iter_mut().find(|m| m.id == model_id) {
            model.healthy = healthy;
            model.circuit_breaker_open = circuit_breaker_open;
            info!(model_id, healthy, circuit_breaker_open, "model health updated");
        }
    }

    fn update_model_load(&self, model_id: &str, load: f64) {
        let mut models = self.models.write().expect("router lock poisoned");
        if let Some(model) = models.iter_mut().find(|m| m.id == model_id) {
            model.current_load = load.clamp(0.0, 1.0);
            debug!(model_id, load, "model load updated");
        }
    }

    fn models(&self) -> Vec<ModelConfig> {
        self.models.read().expect("router lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpt4() -> ModelConfig {
        ModelConfig::new("gpt-4", "GPT-4", ModelTier::Premium, 8192).pricing(0.03, 0.06)
    }

    fn gpt35() -> ModelConfig {
        ModelConfig::new("gpt-3.5", "GPT-3.5 Turbo", ModelTier::Economy, 4096)
            .pricing(0.0015, 0.002)
    }

    fn router(models: Vec<ModelConfig>, cost_weight: f64) -> CostAwareRouter {
        CostAwareRouter::new(models, cost_weight, Arc::new(CircuitBreakerRegistry::new()))
    }

    fn request(prompt: &str, max_tokens: u32) -> InferenceRequest {
        InferenceRequest::builder()
            .prompt(prompt)
            .max_tokens(max_tokens)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn cost_heavy_routing_picks_the_cheap_model() {
        let router = router(vec![gpt4(), gpt35()], 0.9);
        let decision = router.route(&request("Hello world", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-3.5");
        assert!(decision.estimated_cost > 0.0);
    }

    #[tokio::test]
    async fn quality_heavy_routing_picks_the_premium_model() {
        let router = router(vec![gpt4(), gpt35()], 0.0);
        let decision = router.route(&request("Hello world", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-4");
    }

    #[tokio::test]
    async fn selected_model_is_available() {
        let router = router(vec![gpt4(), gpt35()], 0.7);
        let decision = router.route(&request("Hello", 10)).await.unwrap();
        assert!(decision.selected_model.is_available());
    }

    #[tokio::test]
    async fn fallbacks_come_from_remaining_candidates() {
        let router = router(vec![gpt4(), gpt35()], 0.9);
        let decision = router.route(&request("Hello world", 10)).await.unwrap();
        assert_eq!(decision.fallback_models.len(), 1);
        assert_eq!(decision.fallback_models[0].id, "gpt-4");
    }

    #[tokio::test]
    async fn context_length_is_a_hard_gate() {
        // gpt-3.5 (4096 ctx) cannot take 4097 requested tokens.
        let router = router(vec![gpt35(), gpt4()], 1.0);
        let decision = router.route(&request("hi", 4096)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-4");
    }

    #[tokio::test]
    async fn context_length_exactly_equal_is_allowed() {
        // "hi" estimates to 1 input token; 1 + 4095 = 4096 fits exactly.
        let router = router(vec![gpt35()], 1.0);
        let decision = router.route(&request("hi", 4095)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-3.5");
    }

    #[tokio::test]
    async fn unhealthy_models_are_skipped() {
        let router = router(vec![gpt35(), gpt4()], 0.9);
        router.update_model_health("gpt-3.5", false, false);
        let decision = router.route(&request("Hello", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-4");
    }

    #[tokio::test]
    async fn all_unhealthy_fails_with_no_backend() {
        let router = router(vec![gpt35(), gpt4()], 0.9);
        router.update_model_health("gpt-3.5", false, false);
        router.update_model_health("gpt-4", false, false);
        let err = router.route(&request("Hello", 10)).await.unwrap_err();
        assert!(matches!(err, CostwiseError::NoHealthyBackend));
    }

    #[tokio::test]
    async fn open_breaker_excludes_model() {
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        for _ in 0..5 {
            breakers.record_failure("gpt-3.5");
        }
        let router = CostAwareRouter::new(vec![gpt35(), gpt4()], 0.9, breakers);
        let decision = router.route(&request("Hello", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "gpt-4");
        assert!(decision.fallback_models.iter().all(|m| m.id != "gpt-3.5"));
    }

    #[tokio::test]
    async fn load_penalty_shifts_selection() {
        // Two identically priced standard models; only load differs.
        let a = ModelConfig::new("a", "A", ModelTier::Standard, 8192).pricing(0.01, 0.02);
        let b = ModelConfig::new("b", "B", ModelTier::Standard, 8192).pricing(0.01, 0.02);
        let router = router(vec![a, b], 0.5);
        router.update_model_load("a", 0.9);
        let decision = router.route(&request("Hello", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "b");
    }

    #[tokio::test]
    async fn ties_resolve_to_configured_order() {
        let a = ModelConfig::new("first", "First", ModelTier::Standard, 8192).pricing(0.01, 0.02);
        let b = ModelConfig::new("second", "Second", ModelTier::Standard, 8192).pricing(0.01, 0.02);
        let router = router(vec![a, b], 0.5);
        let decision = router.route(&request("Hello", 10)).await.unwrap();
        assert_eq!(decision.selected_model.id, "first");
    }
}
