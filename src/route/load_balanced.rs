//! Round-robin load balancing router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::breaker::CircuitBreakerRegistry;
use super::Router;
use crate::types::{InferenceRequest, ModelConfig, RoutingDecision, RoutingStrategy};
use crate::{CostwiseError, Result};

/// Distributes requests evenly over currently available models,
/// ignoring complexity and cost.
///
/// The cursor increments monotonically and is taken modulo the available
/// set recomputed per call, so unavailable models are skipped without
/// stalling the rotation.
pub struct LoadBalancedRouter {
    models: RwLock<Vec<ModelConfig>>,
    cursor: AtomicUsize,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl LoadBalancedRouter {
    pub fn new(models: Vec<ModelConfig>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            models: RwLock::new(models),
            cursor: AtomicUsize::new(0),
            breakers,
        }
    }
}

#[async_trait]
impl Router for LoadBalancedRouter {
    async fn route(&self, request: &InferenceRequest) -> Result<RoutingDecision> {
        let models = self.models.read().expect("router lock poisoned").clone();
        let available: Vec<&ModelConfig> = models
            .iter()
            .filter(|m| m.is_available() && !self.breakers.is_open(&m.id))
            .collect();
        if available.is_empty() {
            return Err(CostwiseError::NoHealthyBackend);
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        let selected = available[index % available.len()].clone();

        info!(
            request_id = %request.id,
            model = selected.id,
            index,
            "round-robin routing"
        );

        Ok(RoutingDecision {
            request_id: request.id,
            fallback_models: Vec::new(),
            strategy: RoutingStrategy::RoundRobin,
            complexity: None,
            estimated_cost: selected
                .calculate_cost(request.estimated_input_tokens(), request.parameters.max_tokens),
            estimated_latency_ms: selected.avg_latency_ms,
            estimated_quality_score: 0.7,
            decision_reason: format!("round-robin selection: {}", selected.id),
            considered_models: available.iter().map(|m| m.id.clone()).collect(),
            selected_model: selected,
        })
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
