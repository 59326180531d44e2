//! Inference cost calculation.

use std::collections::HashMap;

use tracing::debug;

use crate::types::ModelConfig;

/// Per-1K-token prices (input, output) for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Calculates dollar costs for inference requests.
///
/// Uses the model's configured per-1K prices, with an optional override
/// table taking precedence (e.g. negotiated rates that differ from the
/// published model config).
#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    overrides: HashMap<String, Pricing>,
}

impl CostCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a price override for a model id.
    pub fn with_override(mut self, model_id: impl Into<String>, pricing: Pricing) -> Self {
        self.overrides.insert(model_id.into(), pricing);
        self
    }

    /// Cost in USD for the given token counts on `model`.
    pub fn calculate(&self, model: &ModelConfig, input_tokens: u32, output_tokens: u32) -> f64 {
        let (input_per_1k, output_per_1k) = match self.overrides.get(&model.id) {
            Some(p) => (p.input_per_1k, p.output_per_1k),
            None => (
                model.cost_per_1k_input_tokens,
                model.cost_per_1k_output_tokens,
            ),
        };
        let total = f64::from(input_tokens) / 1000.0 * input_per_1k
            + f64::from(output_tokens) / 1000.0 * output_per_1k;
        debug!(
            model = model.id,
            input_tokens, output_tokens, total, "cost calculated"
        );
        total
    }

    /// Dollars saved by serving with `alternative` instead of `base`
    /// (never negative).
    pub fn calculate_savings(
        &self,
        base: &ModelConfig,
        alternative: &ModelConfig,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        let base_cost = self.calculate(base, input_tokens, output_tokens);
        let alt_cost = self.calculate(alternative, input_tokens, output_tokens);
        (base_cost - alt_cost).max(0.0)
    }
}
