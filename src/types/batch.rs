//! Batch strategy, batch requests, and batch processing metrics

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::request::{InferenceRequest, Priority};
use crate::{CostwiseError, Result};

/// Configuration for batching behaviour.
///
/// Validated at construction: `min_batch_size` must not exceed
/// `max_batch_size`.
///
/// ```rust
/// # use costwise::BatchStrategy;
/// let strategy = BatchStrategy::new(2, 8)
///     .unwrap()
///     .max_wait_ms(100)
///     .target_latency_p95_ms(150);
/// assert_eq!(strategy.min_batch_size, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStrategy {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub max_wait_ms: u64,

    // Adaptive parameters
    pub target_latency_p95_ms: u64,
    pub enable_semantic_grouping: bool,
    pub similarity_threshold: f64,

    // Priority handling
    pub priority_lanes: bool,
    pub express_max_wait_ms: u64,
}

impl BatchStrategy {
    /// Create a strategy with the given size bounds and defaults elsewhere.
    pub fn new(min_batch_size: usize, max_batch_size: usize) -> Result<Self> {
        if min_batch_size > max_batch_size {
            return Err(CostwiseError::InvalidRequest(
                "min_batch_size cannot exceed max_batch_size".into(),
            ));
        }
        Ok(Self {
            min_batch_size,
            max_batch_size,
            ..Self::default()
        })
    }

    pub fn max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = ms;
        self
    }

    pub fn target_latency_p95_ms(mut self, ms: u64) -> Self {
        self.target_latency_p95_ms = ms;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn semantic_grouping(mut self, enabled: bool) -> Self {
        self.enable_semantic_grouping = enabled;
        self
    }

    pub fn priority_lanes(mut self, enabled: bool) -> Self {
        self.priority_lanes = enabled;
        self
    }

    pub fn express_max_wait_ms(mut self, ms: u64) -> Self {
        self.express_max_wait_ms = ms;
        self
    }
}

impl Default for BatchStrategy {
    fn default() -> Self {
        Self {
            min_batch_size: 4,
            max_batch_size: 64,
            max_wait_ms: 50,
            target_latency_p95_ms: 100,
            enable_semantic_grouping: true,
            similarity_threshold: 0.85,
            priority_lanes: true,
            express_max_wait_ms: 10,
        }
    }
}

/// Lifecycle of a batch.
///
/// A batch is sealed on emission (immutable from then on), dispatched by
/// the drain loop, and ends either completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Sealed,
    Dispatched,
    Completed,
    Failed,
}

/// A sealed batch of requests processed as one backend call.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub id: Uuid,
    pub requests: Vec<InferenceRequest>,
    pub created_at: Instant,
    pub strategy: BatchStrategy,

    // Semantic grouping metadata
    pub centroid_embedding: Option<Vec<f32>>,
    pub common_prefix: Option<String>,

    state: BatchState,
}

impl BatchRequest {
    /// Seal a batch. Fails when the batch is empty or exceeds the
    /// strategy's `max_batch_size`.
    pub fn new(requests: Vec<InferenceRequest>, strategy: BatchStrategy) -> Result<Self> {
        if requests.is_empty() {
            return Err(CostwiseError::Internal("cannot seal an empty batch".into()));
        }
        if requests.len() > strategy.max_batch_size {
            return Err(CostwiseError::Internal(format!(
                "batch of {} exceeds max_batch_size {}",
                requests.len(),
                strategy.max_batch_size
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            requests,
            created_at: Instant::now(),
            strategy,
            centroid_embedding: None,
            common_prefix: None,
            state: BatchState::Sealed,
        })
    }

    pub fn size(&self) -> usize {
        self.requests.len()
    }

    /// Highest priority among the batch's members.
    pub fn priority(&self) -> Priority {
        self.requests
            .iter()
            .map(|r| r.priority)
            .max()
            .unwrap_or(Priority::Standard)
    }

    /// Total estimated input tokens across members.
    pub fn estimated_tokens(&self) -> u64 {
        self.requests
            .iter()
            .map(|r| u64::from(r.estimated_input_tokens()))
            .sum()
    }

    /// Milliseconds since the batch was sealed.
    pub fn age_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn mark_dispatched(&mut self) {
        self.state = BatchState::Dispatched;
    }

    pub fn mark_completed(&mut self) {
        self.state = BatchState::Completed;
    }

    pub fn mark_failed(&mut self) {
        self.state = BatchState::Failed;
    }
}

/// Metrics for one processed batch, fed back into adaptive sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMetrics {
    pub batch_id: Uuid,
    pub size: usize,
    pub total_tokens: u64,
    pub processing_time_ms: u64,
    pub wait_time_ms: u64,
    pub throughput_tokens_per_sec: f64,
    /// How well-utilized the batch was relative to its size cap.
    pub efficiency_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(priority: Priority) -> InferenceRequest {
        InferenceRequest::builder()
            .prompt("q")
            .priority(priority)
            .build()
            .unwrap()
    }

    #[test]
    fn strategy_rejects_inverted_bounds() {
        assert!(BatchStrategy::new(10, 5).is_err());
    }

    #[test]
    fn strategy_accepts_equal_bounds() {
        let strategy = BatchStrategy::new(3, 3).unwrap();
        assert_eq!(strategy.min_batch_size, 3);
        assert_eq!(strategy.max_batch_size, 3);
    }

    #[test]
    fn batch_priority_is_maximum_of_members() {
        let strategy = BatchStrategy::new(1, 8).unwrap();
        let batch = BatchRequest::new(
            vec![request(Priority::Batch), request(Priority::Express)],
            strategy,
        )
        .unwrap();
        assert_eq!(batch.priority(), Priority::Express);
    }

    #[test]
    fn batch_enforces_size_cap() {
        let strategy = BatchStrategy::new(1, 2).unwrap();
        let result = BatchRequest::new(
            vec![
                request(Priority::Standard),
                request(Priority::Standard),
                request(Priority::Standard),
            ],
            strategy,
        );
        assert!(result.is_err());
    }

    #[test]
    fn batch_state_transitions() {
        let strategy = BatchStrategy::new(1, 4).unwrap();
        let mut batch =
            BatchRequest::new(vec![request(Priority::Standard)], strategy).unwrap();
        assert_eq!(batch.state(), BatchState::Sealed);
        batch.mark_dispatched();
        assert_eq!(batch.state(), BatchState::Dispatched);
        batch.mark_completed();
        assert_eq!(batch.state(), BatchState::Completed);
    }
}
