//! External collaborator contracts.
//!
//! The engine never generates tokens itself; it orchestrates. Everything
//! it needs from the outside world comes through the traits in this
//! module: [`ModelBackend`] (the LLM serving layer), [`Embedder`] (text →
//! unit-norm vector), [`VectorStore`] (ANN index), and [`KeyValueStore`]
//! (rate limits, distributed locks). In-memory reference implementations
//! ship for the latter two so the engine is testable without
//! infrastructure.

mod embedding;
mod kv;
mod stream;
mod vector;

pub use embedding::{CachingEmbedder, Embedder, EmbedderCacheConfig};
pub use kv::{DistributedLock, InMemoryKeyValueStore, KeyValueStore, RateLimiter};
pub use stream::{bounded_chunks, DEFAULT_STREAM_BUFFER};
pub use vector::{InMemoryVectorStore, SearchHit, VectorStore};

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use tracing::{error, info};

use crate::types::{InferenceRequest, InferenceResponse};
use crate::{CostwiseError, Result};

/// A chunk stream produced by [`ModelBackend::stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Contract every model serving backend must satisfy.
///
/// `infer_batch` must be length-preserving and index-aligned: response
/// `i` answers request `i`. The engine splits batched responses back to
/// their callers positionally.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// The model id this backend serves (matches a `ModelConfig::id`).
    fn model_id(&self) -> &str;

    /// Run inference on a single request.
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let mut responses = self.infer_batch(std::slice::from_ref(request)).await?;
        responses.pop().ok_or_else(|| CostwiseError::BackendError {
            model: self.model_id().to_string(),
            message: "backend returned no response".into(),
        })
    }

    /// Run inference on a batch of requests.
    async fn infer_batch(&self, requests: &[InferenceRequest]) -> Result<Vec<InferenceResponse>>;

    /// Stream response chunks for a single request.
    ///
    /// The stream is a lazy finite sequence of strings that terminates
    /// when the backend closes it.
    async fn stream(&self, request: &InferenceRequest) -> Result<ChunkStream>;

    /// Whether the backend is currently healthy.
    async fn health_check(&self) -> bool;
}

/// Registry of model backends keyed by model id.
pub struct BackendPool {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendPool {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register a backend under its own model id.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        let model_id = backend.model_id().to_string();
        info!(model_id, "backend registered");
        self.backends.insert(model_id, backend);
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(model_id).cloned()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Probe every backend, returning per-model health.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::with_capacity(self.backends.len());
        for (model_id, backend) in &self.backends {
            let healthy = backend.health_check().await;
            if !healthy {
                error!(model_id, "backend health check failed");
            }
            results.insert(model_id.clone(), healthy);
        }
        results
    }
}

impl Default for BackendPool {
    fn default() -> Self {
        Self::new()
    }
}
