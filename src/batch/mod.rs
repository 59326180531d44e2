//! Batching subsystem.
//!
//! Groups pending requests into efficient execution batches subject to a
//! latency budget and priority lanes. Three variants behind the
//! [`Batcher`] capability trait, selected by [`BatcherKind`]:
//!
//! - [`AdaptiveBatcher`] (default) — per-priority FIFOs with a batch size
//!   that tracks observed p95 latency against a target.
//! - [`PriorityBatcher`] — strict priority lanes, no adaptive sizing.
//! - [`SemanticBatcher`] — clusters similar requests to maximize
//!   prompt-prefix reuse on the backends.
//!
//! One dedicated drain loop per model backend repeatedly calls
//! [`collect_batch`](Batcher::collect_batch) and dispatches non-empty
//! results; [`add_request`](Batcher::add_request) is safe to call from any
//! task and returns immediately.

pub mod cluster;

mod adaptive;
mod priority;
mod semantic;

pub use adaptive::AdaptiveBatcher;
pub use priority::PriorityBatcher;
pub use semantic::SemanticBatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{BatchMetrics, BatchRequest, InferenceRequest};
use crate::Result;

/// Batcher variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatcherKind {
    Adaptive,
    Priority,
    Semantic,
}

/// Snapshot of queue depths and batcher counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub express: usize,
    pub standard: usize,
    pub batch: usize,
    pub total: usize,
    pub current_batch_size: usize,
    pub total_batches: u64,
    pub total_requests: u64,
}

/// Capability interface shared by all batcher variants.
///
/// Ordering guarantees: within a priority lane, admission order is
/// preserved through batch assembly; across lanes, strict priority
/// overrides FIFO.
#[async_trait]
pub trait Batcher: Send + Sync {
    /// Enqueue a request. Returns as soon as the request is admitted.
    async fn add_request(&self, request: InferenceRequest) -> Result<()>;

    /// Assemble the next batch, or `None` when nothing is ready yet.
    async fn collect_batch(&self) -> Result<Option<BatchRequest>>;

    /// Feed back the outcome of a processed batch (adaptive sizing input).
    fn record_batch_metrics(&self, metrics: &BatchMetrics);

    /// Current queue depths and counters.
    fn queue_stats(&self) -> QueueStats;
}
