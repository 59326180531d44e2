//! Per-model circuit breakers.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;

/// Consecutive failures that open a breaker.
const FAILURE_THRESHOLD: u32 = 5;

/// How long an opened breaker stays open.
const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Registry of per-model circuit breakers.
///
/// A breaker opens after five consecutive failures and stays open until
/// its wall-clock deadline passes; a success closes it and resets the
/// counter. While open, the model is excluded from both primary and
/// fallback selection.
pub struct CircuitBreakerRegistry {
    open_duration: Duration,
    states: RwLock<HashMap<String, BreakerState>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_open_duration(DEFAULT_OPEN_DURATION)
    }

    pub fn with_open_duration(open_duration: Duration) -> Self {
        Self {
            open_duration,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `model_id`'s breaker is currently open.
    pub fn is_open(&self, model_id: &str) -> bool {
        let states = self.states.read().expect("breaker lock poisoned");
        match states.get(model_id).and_then(|s| s.open_until) {
            Some(deadline) => Instant::now() < deadline,
            None => false,
        }
    }

    /// Record a successful call. Returns `true` when this closed an open
    /// breaker.
    pub fn record_success(&self, model_id: &str) -> bool {
        let mut states = self.states.write().expect("breaker lock poisoned");
        let state = states.entry(model_id.to_string()).or_default();
        let was_open = state.open_until.is_some();
        state.consecutive_failures = 0;
        state.open_until = None;
        if was_open {
            info!(model_id, "circuit breaker closed");
        }
        was_open
    }

    /// Record a failed call. Returns `true` when this opened the breaker.
    pub fn record_failure(&self, model_id: &str) -> bool {
        let mut states = self.states.write().expect("breaker lock poisoned");
        let state = states.entry(model_id.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= FAILURE_THRESHOLD && state.open_until.is_none() {
            state.open_until = Some(Instant::now() + self.open_duration);
            metrics::counter!(telemetry::BREAKER_OPENED_TOTAL, "model" => model_id.to_owned())
                .increment(1);
            warn!(
                model_id,
                failures = state.consecutive_failures,
                "circuit breaker opened"
            );
            return true;
        }
        false
    }

    /// Consecutive failure count for a model (0 if untracked).
    pub fn failure_count(&self, model_id: &str) -> u32 {
        let states = self.states.read().expect("breaker lock poisoned");
        states
            .get(model_id)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
