//! Cost accounting: breakdowns, attribution queries, and optimizer
//! recommendations.

use costwise::{
    CostAttributor, CostBreakdown, CostCalculator, CostOptimizer, ModelConfig, ModelTier,
};
use uuid::Uuid;

fn standard_model() -> ModelConfig {
    ModelConfig::new("test-model", "Test Model", ModelTier::Standard, 2048).pricing(0.01, 0.02)
}

// ============================================================================
// Calculator
// ============================================================================

#[test]
fn cost_follows_published_prices() {
    let calculator = CostCalculator::new();
    let cost = calculator.calculate(&standard_model(), 100, 50);
    let expected = (100.0 / 1000.0) * 0.01 + (50.0 / 1000.0) * 0.02;
    assert!((cost - expected).abs() < 1e-4);
}

#[test]
fn downgrade_savings_are_positive() {
    let calculator = CostCalculator::new();
    let premium = ModelConfig::new("premium", "Premium", ModelTier::Premium, 4096)
        .pricing(0.05, 0.10);
    let savings = calculator.calculate_savings(&premium, &standard_model(), 100, 50);
    assert!(savings > 0.0);
}

// ============================================================================
// Breakdown arithmetic
// ============================================================================

#[test]
fn breakdown_savings_rate() {
    let breakdown = CostBreakdown::new(100.0, 20.0, 30.0, 50.0);
    assert!((breakdown.savings_rate() - 80.0 / 120.0).abs() < 1e-9);
    assert!((breakdown.net_cost() - 40.0).abs() < 1e-9);
}

// ============================================================================
// Attribution
// ============================================================================

fn record(attributor: &CostAttributor, user: &str, feature: &str, net: f64) {
    attributor.attribute(
        Uuid::new_v4(),
        Some(user.into()),
        Some(feature.into()),
        None,
        "default".into(),
        CostBreakdown::new(net, 0.0, 0.0, 0.0),
        100,
        50,
        0,
        25,
    );
}

#[test]
fn per_user_totals_and_feature_scans() {
    let attributor = CostAttributor::new();
    record(&attributor, "alice", "search", 0.02);
    record(&attributor, "alice", "chat", 0.01);
    record(&attributor, "bob", "search", 0.05);

    assert!((attributor.user_costs("alice") - 0.03).abs() < 1e-9);
    assert!((attributor.user_costs("bob") - 0.05).abs() < 1e-9);
    assert_eq!(attributor.feature_costs("search").len(), 2);
}

// ============================================================================
// Optimizer
// ============================================================================

#[test]
fn recommendations_cover_the_three_signals() {
    let attributor = CostAttributor::new();
    // Low hit rate, one dominant user.
    for i in 0..9 {
        record(&attributor, &format!("user-{i}"), "search", 0.001);
    }
    record(&attributor, "whale", "search", 5.0);

    let mut metrics = attributor.aggregate();
    attributor.record_model_cost(&mut metrics, "gpt-4", 4.0);
    attributor.record_model_cost(&mut metrics, "gpt-3.5", 0.5);

    let optimizer = CostOptimizer::new();
    let recommendations = optimizer.recommendations(&metrics);
    assert!(recommendations.iter().any(|r| r.contains("hit rate")));
    assert!(recommendations.iter().any(|r| r.contains("variance")));
    assert!(recommendations.iter().any(|r| r.contains("gpt-4")));
}

#[test]
fn trend_analysis_averages_periods() {
    let attributor = CostAttributor::new();
    record(&attributor, "alice", "search", 1.0);
    let day = attributor.aggregate();

    let optimizer = CostOptimizer::new();
    let trends = optimizer.analyze_trends(&[day.clone(), day]);
    assert!((trends.avg_daily_cost - 1.0).abs() < 1e-9);
    assert!((trends.total_cost - 2.0).abs() < 1e-9);
}
