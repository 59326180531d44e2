//! Semantic grouping batcher.
//!
//! Groups requests by embedding similarity so the backend can reuse
//! prompt-prefix KV state across a batch. Admitted requests are embedded
//! into a pending pool; collection clusters the pool with DBSCAN and
//! emits the largest cluster, annotated with its centroid and any common
//! literal prefix. When no cluster forms, falls back to plain FIFO
//! emission.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use super::cluster::{centroid, common_prefix, dbscan, largest_cluster};
use super::{Batcher, QueueStats};
use crate::backend::Embedder;
use crate::types::{BatchMetrics, BatchRequest, BatchStrategy, InferenceRequest};
use crate::Result;

/// Batcher that clusters semantically similar requests.
pub struct SemanticBatcher {
    strategy: BatchStrategy,
    embedder: Arc<dyn Embedder>,
    /// DBSCAN neighborhood radius: `1 − similarity_threshold`.
    eps: f64,
    inner: Mutex<State>,
}

struct State {
    pending: Vec<Pending>,
    total_batches: u64,
    total_requests: u64,
}

struct Pending {
    request: InferenceRequest,
    embedding: Vec<f32>,
}

impl SemanticBatcher {
    pub fn new(strategy: BatchStrategy, embedder: Arc<dyn Embedder>) -> Self {
        let eps = 1.0 - strategy.similarity_threshold;
        Self {
            strategy,
            embedder,
            eps,
            inner: Mutex::new(State {
                pending: Vec::new(),
                total_batches: 0,
                total_requests: 0,
            }),
        }
    }

    /// FIFO fallback when clustering finds only noise.
    fn collect_simple(&self, state: &mut State) -> Result<Option<BatchRequest>> {
        let take = self.strategy.max_batch_size.min(state.pending.len());
        let requests: Vec<_> = state
            .pending
            .drain(..take)
            .map(|p| p.request)
            .collect();
        let batch = BatchRequest::new(requests, self.strategy.clone())?;
        debug!(batch_id = %batch.id, size = batch.size(), "no cluster formed, simple batch");
        Ok(Some(batch))
    }
}

#[async_trait]
impl Batcher for SemanticBatcher {
    async fn add_request(&self, request: InferenceRequest) -> Result<()> {
        // Embed before taking the lock; the embedder may suspend.
        let embedding = self.embedder.embed(&request.text()).await?;
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        state.pending.push(Pending { request, embedding });
        debug!(pending = state.pending.len(), "request added for clustering");
        Ok(())
    }

    async fn collect_batch(&self) -> Result<Option<BatchRequest>> {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        if state.pending.len() < self.strategy.min_batch_size {
            return Ok(None);
        }

        let embeddings: Vec<Vec<f32>> =
            state.pending.iter().map(|p| p.embedding.clone()).collect();
        let labels = dbscan(&embeddings, self.eps, self.strategy.min_batch_size);

        let Some((cluster_label, cluster_size)) = largest_cluster(&labels) else {
            return self.collect_simple(&mut state);
        };

        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, l)| *l == cluster_label)
            .map(|(i, _)| i)
            .collect();
        indices.truncate(self.strategy.max_batch_size);

        let cluster_vectors: Vec<&[f32]> =
            indices.iter().map(|&i| embeddings[i].as_slice()).collect();
        let batch_centroid = centroid(&cluster_vectors);

        // Remove clustered entries back-to-front so indices stay valid.
        let mut requests: Vec<InferenceRequest> = Vec::with_capacity(indices.len());
        for &i in indices.iter().rev() {
            requests.push(state.pending.remove(i).request);
        }
        requests.reverse();

        let prompts: Vec<&str> = requests
            .iter()
            .filter(|r| !r.prompt.is_empty())
            .map(|r| r.prompt.as_str())
            .collect();
        let prefix = common_prefix(&prompts);

        let mut batch = BatchRequest::new(requests, self.strategy.clone())?;
        batch.centroid_embedding = batch_centroid;
        batch.common_prefix = prefix;
        info!(
            batch_id = %batch.id,
            size = batch.size(),
            cluster_label,
            cluster_size,
            common_prefix_chars = batch
                .common_prefix
                .as_ref()
                .map(|p| p.chars().count())
                .unwrap_or(0),
            "semantic batch collected"
        );
        Ok(Some(batch))
    }

    fn record_batch_metrics(&self, metrics: &BatchMetrics) {
        let mut state = self.inner.lock().expect("batcher lock poisoned");
        state.total_batches += 1;
        state.total_requests += metrics.size as u64;
    }

    fn queue_stats(&self) -> QueueStats {
        let state = self.inner.lock().expect("batcher lock poisoned");
        QueueStats {
            express: 0,
            standard: state.pending.len(),
            batch: 0,
            total: state.pending.len(),
            current_batch_size: self.strategy.min_batch_size,
            total_batches: state.total_batches,
            total_requests: state.total_requests,
        }
    }
}
