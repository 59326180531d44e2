//! Cost breakdown, attribution records, and aggregated cost metrics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Detailed cost breakdown for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Actual LLM API cost.
    pub inference_cost: f64,
    /// Infrastructure cost of serving the request.
    pub compute_cost: f64,
    /// Dollars avoided via caching.
    pub cache_savings: f64,
    /// Dollars avoided via batching and routing choices.
    pub optimization_savings: f64,
}

impl CostBreakdown {
    pub fn new(
        inference_cost: f64,
        compute_cost: f64,
        cache_savings: f64,
        optimization_savings: f64,
    ) -> Self {
        Self {
            inference_cost,
            compute_cost,
            cache_savings,
            optimization_savings,
        }
    }

    /// Total cost before savings.
    pub fn total_cost(&self) -> f64 {
        self.inference_cost + self.compute_cost
    }

    /// Net cost after savings.
    pub fn net_cost(&self) -> f64 {
        self.total_cost() - self.cache_savings - self.optimization_savings
    }

    /// Fraction of gross cost avoided.
    pub fn savings_rate(&self) -> f64 {
        let total = self.total_cost();
        if total == 0.0 {
            0.0
        } else {
            (self.cache_savings + self.optimization_savings) / total
        }
    }
}

/// Attribution of one request's cost to reporting dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAttribution {
    pub request_id: Uuid,

    pub user_id: Option<String>,
    pub feature_name: Option<String>,
    pub experiment_id: Option<String>,
    pub application: String,

    pub breakdown: CostBreakdown,

    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_hits: u32,
    pub latency_ms: u64,
}

/// Aggregated cost metrics over a reporting period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub total_requests: u64,
    pub total_cost_usd: f64,
    pub total_savings_usd: f64,

    pub cost_by_user: BTreeMap<String, f64>,
    pub cost_by_feature: BTreeMap<String, f64>,
    pub cost_by_model: BTreeMap<String, f64>,

    pub cache_hit_rate: f64,
}

impl CostMetrics {
    /// Overall savings rate for the period.
    pub fn savings_rate(&self) -> f64 {
        let denominator = self.total_cost_usd + self.total_savings_usd;
        if denominator == 0.0 {
            0.0
        } else {
            self.total_savings_usd / denominator
        }
    }
}

/// Averages across a sequence of reporting periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub avg_daily_cost: f64,
    pub avg_daily_savings: f64,
    pub avg_savings_rate: f64,
    pub total_cost: f64,
    pub total_savings: f64,
}

/// Dimension a cost driver belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostDimension {
    User,
    Feature,
    Model,
}

/// One entry in a top-cost-drivers report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDriver {
    pub dimension: CostDimension,
    pub id: String,
    pub cost: f64,
}
