//! Adaptive batching with latency-driven batch sizing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Batcher, QueueStats};
use crate::types::{BatchMetrics, BatchRequest, BatchStrategy, InferenceRequest, Priority};
use crate::Result;

/// Express batches never exceed this size regardless of strategy.
const EXPRESS_BATCH_CAP: usize = 4;

/// Number of recent batch latencies kept for the p95 window.
const LATENCY_WINDOW: usize = 100;

/// Adaptive batcher: per-priority FIFOs plus a batch size that tracks the
/// observed p95 processing latency.
///
/// Collection order: Express wins if non-empty; a full Standard batch
/// next; a full Batch-lane batch next; otherwise a mixed batch once the
/// oldest pending request has waited past `max_wait_ms`. The working
/// batch size starts at `min_batch_size` and is adjusted multiplicatively
/// after each completed batch (AIMD-like, in both directions): p95 under
/// 0.8× target grows it ×1.2, p95 over target shrinks it ×0.8, both
/// clamped to the strategy bounds.
pub struct AdaptiveBatcher {
    strategy: BatchStrategy,
    inner: Mutex<State>,
}

struct State {
    express: VecDeque<InferenceRequest>,
    standard: VecDeque<InferenceRequest>,
    batch: VecDeque<InferenceRequest>,
    current_batch_size: usize,
    recent_latencies: VecDeque<u64>,
    total_batches: u64,
    total_requests: u64,
}

impl AdaptiveBatcher {
    pub fn new(strategy: BatchStrategy) -> Self {
        let current_batch_size = strategy.min_batch_size;
        Self {
            strategy,
            inner: Mutex::new(State {
                express: VecDeque::new(),
                standard: VecDeque::new(),
                batch: VecDeque::new(),
                current_batch_size,
                recent_latencies: VecDeque::with_capacity(LATENCY_WINDOW),
                total_batches: 0,
                total_requests: 0,
            }),
        }
    }

    fn collect_express(&self, state: &mut State) -> Result<Option<BatchRequest>> {
        let take = state.express.len().min(EXPRESS_BATCH_CAP);
        let requests: Vec<_> = state.express.drain(..take).collect();
        let strategy = BatchStrategy::new(1, EXPRESS_BATCH_CAP)?
            .max_wait_ms(self.strategy.express_max_wait_ms);
        let batch = BatchRequest::new(requests, strategy)?;
        info!(batch_id = %batch.id, size = batch.size(), "express batch collected");
        Ok(Some(batch))
    }

    fn collect_standard(&self, state: &mut State) -> Result<Option<BatchRequest>> {
        let take = state.current_batch_size.min(state.standard.len());
        let requests: Vec<_> = state.standard.drain(..take).collect();
        let batch = BatchRequest::new(requests, self.strategy.clone())?;
        info!(
            batch_id = %batch.id,
            size = batch.size(),
            target_size = state.current_batch_size,
            "standard batch collected"
        );
        Ok(Some(batch))
    }

    fn collect_batch_lane(&self, state: &mut State) -> Result<Option<BatchRequest>> {
        let take = self.strategy.max_batch_size.min(state.batch.len());
        let requests: Vec<_> = state.batch.drain(..take).collect();
        let batch = BatchRequest::new(requests, self.strategy.clone())?;
        info!(batch_id = %batch.id, size = batch.size(), "batch-lane batch collected");
        Ok(Some(batch))
    }

    /// Mixed batch: only once the oldest pending request has aged past
    /// `max_wait_ms`. Standard requests fill first, then Batch, up to the
    /// current working size; may be smaller than `min_batch_size`.
    fn collect_mixed(&self, state: &mut State) -> Result<Option<BatchRequest>> {
        let oldest_age_ms = oldest_age_ms(state);
        if oldest_age_ms < self.strategy.max_wait_ms {
            return Ok(None);
        }
        let target = state.current_batch_size;
        let mut requests = Vec::with_capacity(target);
        while requests.len() < target {
            match state.standard.pop_front() {
                Some(r) => requests.push(r),
                None => break,
            }
        }
        while requests.len() < target {
            match state.batch.pop_front() {
                Some(r) => requests.push(r),
                None => break,
            }
        }
        if requests.is_empty() {
            return Ok(None);
        }
        let batch = BatchRequest::new(requests, self.strategy.clone())?;
        info!(
            batch_id = %batch.id,
            size = batch.size(),
            oldest_age_ms,
            "mixed batch collected"
        );
        Ok(Some(batch))
    }
}

/// Age in milliseconds of the oldest request across all lanes.
fn oldest_age_ms(state: &State) -> u64 {
    [&state.express, &state.standard, &state.batch]
        .iter()
        .filter_map(|queue| queue.front())
        .map(|request| request.age_ms())
        .max()
        .unwrap_or(0)
}

/// p95 over the latency window (index `len × 0.95`, clamped).
fn p95(latencies: &VecDeque<u64>) -> Option<u64> {
    if latencies.is_empty() {
        return None;
    }
    let mut sorted: Vec<u64> = latencies.iter().copied().collect();
    sorted.sort_unstable();
    let index = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

#[async_trait]
impl Batcher for AdaptiveBatcher {
    async fn add_request(&self, request: InferenceRequest) -> Result<()> {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        let priority = request.priority;
        match priority {
            Priority::Express => state.express.push_back(request),
            Priority::Standard => state.standard.push_back(request),
            Priority::Batch => state.batch.push_back(request),
        }
        debug!(
            priority = priority.as_str(),
            express = state.express.len(),
            standard = state.standard.len(),
            batch = state.batch.len(),
            "request queued"
        );
        Ok(())
    }

    async fn collect_batch(&self) -> Result<Option<BatchRequest>> {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        if !state.express.is_empty() {
            return self.collect_express(&mut state);
        }
        if state.standard.len() >= state.current_batch_size {
            return self.collect_standard(&mut state);
        }
        if state.batch.len() >= self.strategy.max_batch_size {
            return self.collect_batch_lane(&mut state);
        }
        self.collect_mixed(&mut state)
    }

    fn record_batch_metrics(&self, metrics: &BatchMetrics) {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        if state.recent_latencies.len() == LATENCY_WINDOW {
            state.recent_latencies.pop_front();
        }
        state.recent_latencies.push_back(metrics.processing_time_ms);
        state.total_batches += 1;
        state.total_requests += metrics.size as u64;

        let Some(p95_latency) = p95(&state.recent_latencies) else {
            return;
        };
        let target = self.strategy.target_latency_p95_ms;
        let current = state.current_batch_size;
        if (p95_latency as f64) < target as f64 * 0.8 {
            // Ceil so ×1.2 growth escapes small sizes (2 × 1.2 truncates
            // back to 2).
            state.current_batch_size =
                ((current as f64 * 1.2).ceil() as usize).min(self.strategy.max_batch_size);
        } else if p95_latency > target {
            state.current_batch_size =
                ((current as f64 * 0.8).floor() as usize).max(self.strategy.min_batch_size);
        }
        if state.current_batch_size != current {
            debug!(
                from = current,
                to = state.current_batch_size,
                p95_latency,
                target,
                "batch size adjusted"
            );
        }
    }

    fn queue_stats(&self) -> QueueStats {
        let state = self.inner.lock().expect("batcher lock poisoned");
        QueueStats {
            express: state.express.len(),
            standard: state.standard.len(),
            batch: state.batch.len(),
            total: state.express.len() + state.standard.len() + state.batch.len(),
            current_batch_size: state.current_batch_size,
            total_batches: state.total_batches,
            total_requests: state.total_requests,
        }
    }
}
