//! Strict priority-lane batching.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Batcher, QueueStats};
use crate::types::{BatchMetrics, BatchRequest, BatchStrategy, InferenceRequest, Priority};
use crate::Result;

/// Express batches never exceed this size.
const EXPRESS_BATCH_CAP: usize = 4;

/// Batcher that strictly enforces priority lanes.
///
/// `collect_batch` drains the highest non-empty lane only, so a
/// high-priority request never waits behind lower-priority ones. Within a
/// lane, FIFO. No adaptive sizing: Standard and Batch lanes fill up to
/// `max_batch_size`, Express up to 4.
pub struct PriorityBatcher {
    strategy: BatchStrategy,
    inner: Mutex<State>,
}

struct State {
    express: VecDeque<InferenceRequest>,
    standard: VecDeque<InferenceRequest>,
    batch: VecDeque<InferenceRequest>,
    total_batches: u64,
    total_requests: u64,
}

impl PriorityBatcher {
    pub fn new(strategy: BatchStrategy) -> Self {
        Self {
            strategy,
            inner: Mutex::new(State {
                express: VecDeque::new(),
                standard: VecDeque::new(),
                batch: VecDeque::new(),
                total_batches: 0,
                total_requests: 0,
            }),
        }
    }

    fn drain_lane(
        &self,
        state: &mut State,
        priority: Priority,
    ) -> Result<Option<BatchRequest>> {
        let (queue, cap) = match priority {
            Priority::Express => (&mut state.express, EXPRESS_BATCH_CAP),
            Priority::Standard => (&mut state.standard, self.strategy.max_batch_size),
            Priority::Batch => (&mut state.batch, self.strategy.max_batch_size),
        };
        let take = queue.len().min(cap);
        let requests: Vec<_> = queue.drain(..take).collect();

        let strategy = if priority == Priority::Express {
            BatchStrategy::new(1, EXPRESS_BATCH_CAP)?
                .max_wait_ms(self.strategy.express_max_wait_ms)
        } else {
            self.strategy.clone()
        };
        let batch = BatchRequest::new(requests, strategy)?;
        info!(
            priority = priority.as_str(),
            batch_id = %batch.id,
            size = batch.size(),
            "priority batch collected"
        );
        Ok(Some(batch))
    }
}

#[async_trait]
impl Batcher for PriorityBatcher {
    async fn add_request(&self, request: InferenceRequest) -> Result<()> {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        let priority = request.priority;
        match priority {
            Priority::Express => state.express.push_back(request),
            Priority::Standard => state.standard.push_back(request),
            Priority::Batch => state.batch.push_back(request),
        }
        debug!(priority = priority.as_str(), "priority request queued");
        Ok(())
    }

    async fn collect_batch(&self) -> Result<Option<BatchRequest>> {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        // Highest non-empty lane only.
        if !state.express.is_empty() {
            return self.drain_lane(&mut state, Priority::Express);
        }
        if !state.standard.is_empty() {
            return self.drain_lane(&mut state, Priority::Standard);
        }
        if !state.batch.is_empty() {
            return self.drain_lane(&mut state, Priority::Batch);
        }
        Ok(None)
    }

    fn record_batch_metrics(&self, metrics: &BatchMetrics) {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        state.total_batches += 1;
        state.total_requests += metrics.size as u64;
    }

    fn queue_stats(&self) -> QueueStats {
        let state = self.inner.lock().expect("batcher lock poisoned");
        QueueStats {
            express: state.express.len(),
            standard: state.standard.len(),
            batch: state.batch.len(),
            total: state.express.len() + state.standard.len() + state.batch.len(),
            current_batch_size: self.strategy.max_batch_size,
            total_batches: state.total_batches,
            total_requests: state.total_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, priority: Priority) -> InferenceRequest {
        InferenceRequest::builder()
            .prompt(prompt)
            .priority(priority)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn lanes_do_not_mix() {
        let batcher = PriorityBatcher::new(BatchStrategy::new(2, 8).unwrap());
        batcher.add_request(request("A", Priority::Standard)).await.unwrap();
        batcher.add_request(request("B", Priority::Express)).await.unwrap();
        batcher.add_request(request("C", Priority::Batch)).await.unwrap();

        let first = batcher.collect_batch().await.unwrap().unwrap();
        assert_eq!(first.priority(), Priority::Express);
        assert_eq!(first.size(), 1);

        let second = batcher.collect_batch().await.unwrap().unwrap();
        assert_eq!(second.priority(), Priority::Standard);

        let third = batcher.collect_batch().await.unwrap().unwrap();
        assert_eq!(third.priority(), Priority::Batch);

        assert!(batcher.collect_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn express_cap_is_four() {
        let batcher = PriorityBatcher::new(BatchStrategy::new(1, 64).unwrap());
        for i in 0..6 {
            batcher
                .add_request(request(&format!("e{i}"), Priority::Express))
                .await
                .unwrap();
        }
        let batch = batcher.collect_batch().await.unwrap().unwrap();
        assert_eq!(batch.size(), 4);
        assert_eq!(batcher.queue_stats().express, 2);
    }

    #[tokio::test]
    async fn fifo_within_lane() {
        let batcher = PriorityBatcher::new(BatchStrategy::new(1, 8).unwrap());
        for i in 0..3 {
            batcher
                .add_request(request(&format!("s{i}"), Priority::Standard))
                .await
                .unwrap();
        }
        let batch = batcher.collect_batch().await.unwrap().unwrap();
        let prompts: Vec<_> = batch.requests.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["s0", "s1", "s2"]);
    }
}
