//! Cost optimization analysis and recommendations.

use tracing::info;

use crate::types::{CostDimension, CostDriver, CostMetrics, TrendSummary};

/// Cache hit rate below which a recommendation fires.
const LOW_HIT_RATE: f64 = 0.4;

/// Top-user-to-average multiple that flags cost variance.
const USER_VARIANCE_FACTOR: f64 = 5.0;

/// Analyzes aggregated cost metrics and produces actionable
/// recommendations.
#[derive(Debug, Clone, Default)]
pub struct CostOptimizer;

impl CostOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Averages across a sequence of reporting periods.
    pub fn analyze_trends(&self, periods: &[CostMetrics]) -> TrendSummary {
        if periods.is_empty() {
            return TrendSummary::default();
        }
        let n = periods.len() as f64;
        let total_cost: f64 = periods.iter().map(|m| m.total_cost_usd).sum();
        let total_savings: f64 = periods.iter().map(|m| m.total_savings_usd).sum();
        TrendSummary {
            avg_daily_cost: total_cost / n,
            avg_daily_savings: total_savings / n,
            avg_savings_rate: periods.iter().map(|m| m.savings_rate()).sum::<f64>() / n,
            total_cost,
            total_savings,
        }
    }

    /// Top cost drivers across all dimensions, highest cost first.
    pub fn top_cost_drivers(&self, metrics: &CostMetrics, limit: usize) -> Vec<CostDriver> {
        let mut drivers: Vec<CostDriver> = Vec::new();
        for (id, cost) in &metrics.cost_by_user {
            drivers.push(CostDriver {
                dimension: CostDimension::User,
                id: id.clone(),
                cost: *cost,
            });
        }
        for (id, cost) in &metrics.cost_by_feature {
            drivers.push(CostDriver {
                dimension: CostDimension::Feature,
                id: id.clone(),
                cost: *cost,
            });
        }
        for (id, cost) in &metrics.cost_by_model {
            drivers.push(CostDriver {
                dimension: CostDimension::Model,
                id: id.clone(),
                cost: *cost,
            });
        }
        drivers.sort_by(|a, b| b.cost.total_cmp(&a.cost));
        drivers.truncate(limit);
        drivers
    }

    /// Actionable recommendations derived from the aggregate.
    pub fn recommendations(&self, metrics: &CostMetrics) -> Vec<String> {
        let mut recommendations = Vec::new();

        if metrics.cache_hit_rate < LOW_HIT_RATE {
            recommendations.push(
                "Cache hit rate is low. Consider enabling semantic caching or reviewing prompts."
                    .to_string(),
            );
        }

        if !metrics.cost_by_user.is_empty() {
            let top_user_cost = metrics
                .cost_by_user
                .values()
                .fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let avg_user_cost = metrics.total_cost_usd / metrics.cost_by_user.len() as f64;
            if top_user_cost > avg_user_cost * USER_VARIANCE_FACTOR {
                recommendations.push(
                    "High variance in user costs detected. Implement per-user throttling."
                        .to_string(),
                );
            }
        }

        if let Some((model, _)) = metrics
            .cost_by_model
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
        {
            recommendations.push(format!(
                "Consider routing more requests away from {model} to cheaper models."
            ));
        }

        info!(count = recommendations.len(), "optimization recommendations");
        recommendations
    }
}
