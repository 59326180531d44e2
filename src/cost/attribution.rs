//! Cost attribution across reporting dimensions.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;
use uuid::Uuid;

use crate::types::{CostAttribution, CostBreakdown, CostMetrics};

/// Attributes request costs to users, features, and experiments.
///
/// Records are indexed by user id; other dimensions are answered by
/// scanning. Attribution is best-effort bookkeeping: it never affects a
/// request's user-visible outcome.
pub struct CostAttributor {
    by_user: RwLock<HashMap<String, Vec<CostAttribution>>>,
    unattributed: RwLock<Vec<CostAttribution>>,
}

impl CostAttributor {
    pub fn new() -> Self {
        Self {
            by_user: RwLock::new(HashMap::new()),
            unattributed: RwLock::new(Vec::new()),
        }
    }

    /// Record one request's cost attribution.
    #[allow(clippy::too_many_arguments)]
    pub fn attribute(
        &self,
        request_id: Uuid,
        user_id: Option<String>,
        feature_name: Option<String>,
        experiment_id: Option<String>,
        application: String,
        breakdown: CostBreakdown,
        input_tokens: u32,
        output_tokens: u32,
        cache_hits: u32,
        latency_ms: u64,
    ) -> CostAttribution {
        let attribution = CostAttribution {
            request_id,
            user_id: user_id.clone(),
            feature_name: feature_name.clone(),
            experiment_id,
            application,
            breakdown,
            input_tokens,
            output_tokens,
            cache_hits,
            latency_ms,
        };

        match &user_id {
            Some(user) => self
                .by_user
                .write()
                .expect("attribution lock poisoned")
                .entry(user.clone())
                .or_default()
                .push(attribution.clone()),
            None => self
                .unattributed
                .write()
                .expect("attribution lock poisoned")
                .push(attribution.clone()),
        }

        info!(
            request_id = %request_id,
            user_id = user_id.as_deref().unwrap_or("-"),
            feature_name = feature_name.as_deref().unwrap_or("-"),
            net_cost = breakdown.net_cost(),
            "cost attributed"
        );
        attribution
    }

    /// Total net cost attributed to a user.
    pub fn user_costs(&self, user_id: &str) -> f64 {
        self.by_user
            .read()
            .expect("attribution lock poisoned")
            .get(user_id)
            .map(|records| records.iter().map(|a| a.breakdown.net_cost()).sum())
            .unwrap_or(0.0)
    }

    /// Every attribution recorded for a feature, across all users.
    pub fn feature_costs(&self, feature_name: &str) -> Vec<CostAttribution> {
        let by_user = self.by_user.read().expect("attribution lock poisoned");
        let unattributed = self.unattributed.read().expect("attribution lock poisoned");
        by_user
            .values()
            .flatten()
            .chain(unattributed.iter())
            .filter(|a| a.feature_name.as_deref() == Some(feature_name))
            .cloned()
            .collect()
    }

    /// Aggregate everything recorded so far into period metrics.
    pub fn aggregate(&self) -> CostMetrics {
        let by_user = self.by_user.read().expect("attribution lock poisoned");
        let unattributed = self.unattributed.read().expect("attribution lock poisoned");

        let mut metrics = CostMetrics::default();
        let mut cache_hits = 0u64;
        for attribution in by_user.values().flatten().chain(unattributed.iter()) {
            let net = attribution.breakdown.net_cost();
            metrics.total_requests += 1;
            metrics.total_cost_usd += net;
            metrics.total_savings_usd +=
                attribution.breakdown.cache_savings + attribution.breakdown.optimization_savings;
            cache_hits += u64::from(attribution.cache_hits);

            if let Some(user) = &attribution.user_id {
                *metrics.cost_by_user.entry(user.clone()).or_default() += net;
            }
            if let Some(feature) = &attribution.feature_name {
                *metrics.cost_by_feature.entry(feature.clone()).or_default() += net;
            }
        }
        if metrics.total_requests > 0 {
            metrics.cache_hit_rate = cache_hits as f64 / metrics.total_requests as f64;
        }
        metrics
    }

    /// Add model-dimension costs to an aggregate (the attributor itself
    /// does not track models; the engine passes them through).
    pub fn record_model_cost(&self, metrics: &mut CostMetrics, model_id: &str, cost: f64) {
        *metrics
            .cost_by_model
            .entry(model_id.to_string())
            .or_default() += cost;
    }
}

impl Default for CostAttributor {
    fn default() -> Self {
        Self::new()
    }
}
