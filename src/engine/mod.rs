//! The orchestration engine.
//!
//! [`Engine`] owns one instance of each collaborator — cache hierarchy,
//! router, circuit breakers, cost accounting, and one batching lane per
//! registered backend — and runs the per-request pipeline:
//!
//! ```text
//! infer ──► rate limit ──► cache probe ──► route ──► lane admission
//!                                                        │
//!   response ◄── cache fill ◄── split by index ◄── drain loop dispatch
//!      │
//!      └──► cost attribution
//! ```
//!
//! Each lane has a dedicated drain loop (spawned by [`Engine::start`])
//! that seals batches, dispatches them to the backend with
//! retry-with-fallback, and hands per-request responses back through
//! oneshot channels. Lifecycle ordering: caches are built before the
//! router, the router before the batchers, the batchers before the
//! backends start draining; `stop` tears down in reverse.

mod builder;

pub use builder::EngineBuilder;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{bounded_chunks, BackendPool, ChunkStream, RateLimiter, DEFAULT_STREAM_BUFFER};
use crate::batch::{Batcher, QueueStats};
use crate::cache::{CacheHierarchy, CacheLookup};
use crate::cost::{CostAttributor, CostCalculator, CostOptimizer};
use crate::route::{CircuitBreakerRegistry, FallbackChain, Router};
use crate::telemetry;
use crate::types::{
    BatchMetrics, BatchRequest, CostBreakdown, CostMetrics, HierarchyStats, InferenceRequest,
    InferenceResponse, ModelConfig, RoutingDecision,
};
use crate::{CostwiseError, Result};

/// Total dispatch attempts per batch (primary + fallbacks).
const MAX_DISPATCH_ATTEMPTS: usize = 3;

/// Backoff before retry attempt n (ms).
const BACKOFF_MS: [u64; 3] = [50, 250, 1000];

/// One batching lane per model backend.
pub(crate) struct Lane {
    model_id: String,
    batcher: Arc<dyn Batcher>,
    notify: Notify,
    waiters: Mutex<HashMap<Uuid, Waiter>>,
}

struct Waiter {
    tx: oneshot::Sender<Result<InferenceResponse>>,
    prefix_hint: Option<String>,
}

pub(crate) struct EngineInner {
    pub(crate) caches: CacheHierarchy,
    pub(crate) router: Arc<dyn Router>,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) backends: BackendPool,
    pub(crate) lanes: HashMap<String, Arc<Lane>>,
    pub(crate) calculator: CostCalculator,
    pub(crate) attributor: CostAttributor,
    pub(crate) optimizer: CostOptimizer,
    pub(crate) rate_limiter: Option<RateLimiter>,
    pub(crate) poll_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineInner {
    pub(crate) fn make_lane(model_id: String, batcher: Arc<dyn Batcher>) -> Arc<Lane> {
        Arc::new(Lane {
            model_id,
            batcher,
            notify: Notify::new(),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn new(
        caches: CacheHierarchy,
        router: Arc<dyn Router>,
        breakers: Arc<CircuitBreakerRegistry>,
        backends: BackendPool,
        lanes: HashMap<String, Arc<Lane>>,
        calculator: CostCalculator,
        rate_limiter: Option<RateLimiter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            caches,
            router,
            breakers,
            backends,
            lanes,
            calculator,
            attributor: CostAttributor::new(),
            optimizer: CostOptimizer::new(),
            rate_limiter,
            poll_interval,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

/// The cost-optimized inference orchestrator.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Spawn one drain loop per registered backend. Idempotent.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock().expect("engine lock poisoned");
        if !tasks.is_empty() {
            return;
        }
        for lane in self.inner.lanes.values() {
            let inner = self.inner.clone();
            let lane = lane.clone();
            tasks.push(tokio::spawn(async move {
                drain_loop(inner, lane).await;
            }));
        }
        info!(lanes = self.inner.lanes.len(), "engine started");
    }

    /// Abort the drain loops. In-flight backend calls are abandoned;
    /// caches stay consistent because cache writes happen only on
    /// successful dispatch.
    pub fn stop(&self) {
        let mut tasks = self.inner.tasks.lock().expect("engine lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("engine stopped");
    }

    /// Run one request through the full pipeline.
    pub async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let started = Instant::now();
        let inner = &self.inner;

        if let Some(limiter) = &inner.rate_limiter {
            let key = request
                .metadata
                .user_id
                .clone()
                .unwrap_or_else(|| request.metadata.application.clone());
            limiter.check(&key).await?;
        }

        let mut prefix_hint = None;
        if request.use_cache {
            match inner.caches.get(&request).await {
                CacheLookup::Hit(response) => {
                    metrics::counter!(
                        telemetry::REQUESTS_TOTAL,
                        "model" => response.model_used.clone(),
                        "status" => "ok",
                    )
                    .increment(1);
                    self.attribute_cache_hit(&request, &response);
                    return Ok(response);
                }
                CacheLookup::PrefixHint(prefix) => prefix_hint = Some(prefix),
                CacheLookup::Miss => {}
            }
        }

        let decision = inner.router.route(&request).await?;
        let model_id = decision.selected_model.id.clone();
        let lane = inner.lanes.get(&model_id).ok_or_else(|| {
            CostwiseError::Configuration(format!("no backend registered for model '{model_id}'"))
        })?;

        let (tx, rx) = oneshot::channel();
        lane.waiters
            .lock()
            .expect("lane lock poisoned")
            .insert(request.id, Waiter { tx, prefix_hint });

        if let Err(e) = lane.batcher.add_request(request.clone()).await {
            lane.waiters
                .lock()
                .expect("lane lock poisoned")
                .remove(&request.id);
            return Err(e);
        }
        lane.notify.notify_one();
        debug!(request_id = %request.id, model = model_id, "request admitted to lane");

        let mut response = match rx.await {
            Ok(result) => result.inspect_err(|e| {
                metrics::counter!(
                    telemetry::REQUESTS_TOTAL,
                    "model" => model_id.clone(),
                    "status" => "error",
                )
                .increment(1);
                warn!(request_id = %request.id, error = %e, "dispatch failed");
            })?,
            Err(_) => {
                return Err(CostwiseError::Internal(
                    "dispatch task dropped the request".into(),
                ))
            }
        };

        response.latency_ms = started.elapsed().as_millis() as u64;
        response.queue_time_ms = response.latency_ms.saturating_sub(response.inference_time_ms);

        if request.use_cache {
            inner.caches.insert(&request, &response).await;
        }
        self.attribute_dispatch(&request, &response, &decision);

        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "model" => response.model_used.clone(),
            "status" => "ok",
        )
        .increment(1);
        metrics::histogram!(
            telemetry::REQUEST_DURATION_SECONDS,
            "model" => response.model_used.clone(),
        )
        .record(started.elapsed().as_secs_f64());
        metrics::histogram!(
            telemetry::REQUEST_COST_USD,
            "model" => response.model_used.clone(),
        )
        .record(response.usage.cost_usd);

        Ok(response)
    }

    /// Stream response chunks for one request.
    ///
    /// Streams bypass batching and caching: the request is routed, then
    /// chunks flow from the backend through a bounded backpressure
    /// channel.
    pub async fn infer_stream(&self, request: InferenceRequest) -> Result<ChunkStream> {
        let inner = &self.inner;
        if let Some(limiter) = &inner.rate_limiter {
            let key = request
                .metadata
                .user_id
                .clone()
                .unwrap_or_else(|| request.metadata.application.clone());
            limiter.check(&key).await?;
        }
        let decision = inner.router.route(&request).await?;
        let backend = inner
            .backends
            .get(&decision.selected_model.id)
            .ok_or_else(|| {
                CostwiseError::Configuration(format!(
                    "no backend registered for model '{}'",
                    decision.selected_model.id
                ))
            })?;
        let stream = backend.stream(&request).await?;
        Ok(bounded_chunks(stream, DEFAULT_STREAM_BUFFER))
    }

    /// Invalidate cached responses; `None` clears everything.
    pub async fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.inner.caches.invalidate(pattern).await
    }

    pub fn cache_stats(&self) -> HierarchyStats {
        self.inner.caches.stats()
    }

    /// Queue depths per model lane.
    pub fn queue_stats(&self) -> HashMap<String, QueueStats> {
        self.inner
            .lanes
            .iter()
            .map(|(model_id, lane)| (model_id.clone(), lane.batcher.queue_stats()))
            .collect()
    }

    pub fn models(&self) -> Vec<ModelConfig> {
        self.inner.router.models()
    }

    pub fn update_model_health(&self, model_id: &str, healthy: bool, circuit_breaker_open: bool) {
        self.inner
            .router
            .update_model_health(model_id, healthy, circuit_breaker_open);
    }

    pub fn update_model_load(&self, model_id: &str, load: f64) {
        self.inner.router.update_model_load(model_id, load);
    }

    /// Probe every backend and push the results into the router.
    pub async fn refresh_backend_health(&self) {
        for (model_id, healthy) in self.inner.backends.health_check_all().await {
            let breaker_open = self.inner.breakers.is_open(&model_id);
            self.inner
                .router
                .update_model_health(&model_id, healthy, breaker_open);
        }
    }

    /// Aggregate cost metrics recorded so far.
    pub fn cost_metrics(&self) -> CostMetrics {
        self.inner.attributor.aggregate()
    }

    /// Total net cost attributed to a user.
    pub fn user_costs(&self, user_id: &str) -> f64 {
        self.inner.attributor.user_costs(user_id)
    }

    /// Attribution records for a feature.
    pub fn feature_costs(&self, feature_name: &str) -> Vec<crate::types::CostAttribution> {
        self.inner.attributor.feature_costs(feature_name)
    }

    /// Optimization recommendations over everything recorded so far.
    pub fn recommendations(&self) -> Vec<String> {
        self.inner
            .optimizer
            .recommendations(&self.inner.attributor.aggregate())
    }

    fn attribute_cache_hit(&self, request: &InferenceRequest, response: &InferenceResponse) {
        let breakdown = CostBreakdown::new(0.0, 0.0, response.cost_saved_usd(), 0.0);
        self.inner.attributor.attribute(
            request.id,
            request.metadata.user_id.clone(),
            request.metadata.feature_name.clone(),
            request.metadata.experiment_id.clone(),
            request.metadata.application.clone(),
            breakdown,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            1,
            response.latency_ms,
        );
    }

    fn attribute_dispatch(
        &self,
        request: &InferenceRequest,
        response: &InferenceResponse,
        decision: &RoutingDecision,
    ) {
        // Routing savings: what the priciest considered model would have
        // charged versus what we actually paid.
        let models = self.inner.router.models();
        let optimization_savings = models
            .iter()
            .filter(|m| decision.considered_models.contains(&m.id))
            .map(|baseline| {
                self.inner.calculator.calculate_savings(
                    baseline,
                    &decision.selected_model,
                    response.usage.prompt_tokens,
                    response.usage.completion_tokens,
                )
            })
            .fold(0.0, f64::max);
        let breakdown =
            CostBreakdown::new(response.usage.cost_usd, 0.0, 0.0, optimization_savings);
        self.inner.attributor.attribute(
            request.id,
            request.metadata.user_id.clone(),
            request.metadata.feature_name.clone(),
            request.metadata.experiment_id.clone(),
            request.metadata.application.clone(),
            breakdown,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            0,
            response.latency_ms,
        );
    }
}

/// One lane's drain loop: collect, dispatch, repeat.
async fn drain_loop(inner: Arc<EngineInner>, lane: Arc<Lane>) {
    loop {
        match lane.batcher.collect_batch().await {
            Ok(Some(batch)) => dispatch_batch(&inner, &lane, batch).await,
            Ok(None) => {
                // Wake on admission, or tick so deadline-forced batches
                // are emitted even without new arrivals.
                tokio::select! {
                    _ = lane.notify.notified() => {}
                    _ = tokio::time::sleep(inner.poll_interval) => {}
                }
            }
            Err(e) => {
                warn!(model = lane.model_id, error = %e, "batch collection failed");
                tokio::time::sleep(inner.poll_interval).await;
            }
        }
    }
}

/// Dispatch one sealed batch with retry-with-fallback, then deliver the
/// per-request responses to their waiters.
async fn dispatch_batch(inner: &Arc<EngineInner>, lane: &Arc<Lane>, mut batch: BatchRequest) {
    let wait_time_ms = batch
        .requests
        .iter()
        .map(|r| r.age_ms())
        .max()
        .unwrap_or(0);
    batch.mark_dispatched();

    // A prefix-cache hit on any member becomes the batch's prefix hint
    // unless the batcher already attached one.
    if batch.common_prefix.is_none() {
        let waiters = lane.waiters.lock().expect("lane lock poisoned");
        batch.common_prefix = batch
            .requests
            .iter()
            .find_map(|r| waiters.get(&r.id).and_then(|w| w.prefix_hint.clone()));
    }

    let models = inner.router.models();
    let primary = models
        .iter()
        .find(|m| m.id == lane.model_id)
        .cloned()
        .unwrap_or_else(|| {
            ModelConfig::new(
                lane.model_id.clone(),
                lane.model_id.clone(),
                crate::types::ModelTier::Standard,
                u32::MAX,
            )
        });
    let fallbacks: Vec<ModelConfig> = models
        .iter()
        .filter(|m| {
            m.id != lane.model_id && m.is_available() && !inner.breakers.is_open(&m.id)
        })
        .cloned()
        .collect();
    let mut chain = FallbackChain::new(primary, fallbacks, MAX_DISPATCH_ATTEMPTS);

    let mut attempt = 0usize;
    let mut last_err: Option<CostwiseError> = None;
    while let Some(model) = chain.next_model() {
        if attempt > 0 {
            let delay = BACKOFF_MS[(attempt - 1).min(BACKOFF_MS.len() - 1)];
            metrics::counter!(telemetry::DISPATCH_RETRIES_TOTAL, "model" => model.id.clone())
                .increment(1);
            warn!(
                batch_id = %batch.id,
                model = model.id,
                attempt,
                delay_ms = delay,
                "retrying batch dispatch"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        attempt += 1;

        let Some(backend) = inner.backends.get(&model.id) else {
            last_err = Some(CostwiseError::Configuration(format!(
                "no backend registered for model '{}'",
                model.id
            )));
            continue;
        };

        let dispatch_start = Instant::now();
        match backend.infer_batch(&batch.requests).await {
            Ok(responses) if responses.len() == batch.size() => {
                let inference_time_ms = dispatch_start.elapsed().as_millis() as u64;
                record_success(inner, &model);
                deliver_batch(inner, lane, &mut batch, &model, responses, inference_time_ms,
                    wait_time_ms);
                return;
            }
            Ok(responses) => {
                record_failure(inner, &model);
                last_err = Some(CostwiseError::BackendError {
                    model: model.id.clone(),
                    message: format!(
                        "returned {} responses for a batch of {}",
                        responses.len(),
                        batch.size()
                    ),
                });
            }
            Err(e) => {
                record_failure(inner, &model);
                last_err = Some(e);
            }
        }
    }

    // Chain exhausted: fail every waiter with the last error.
    batch.mark_failed();
    let err = last_err.unwrap_or(CostwiseError::NoHealthyBackend);
    warn!(batch_id = %batch.id, error = %err, "batch dispatch exhausted fallback chain");
    let mut waiters = lane.waiters.lock().expect("lane lock poisoned");
    for request in &batch.requests {
        if let Some(waiter) = waiters.remove(&request.id) {
            let _ = waiter.tx.send(Err(err.clone()));
        }
    }
}

/// Split a successful batch response positionally and complete the batch.
fn deliver_batch(
    inner: &Arc<EngineInner>,
    lane: &Arc<Lane>,
    batch: &mut BatchRequest,
    model: &ModelConfig,
    responses: Vec<InferenceResponse>,
    inference_time_ms: u64,
    wait_time_ms: u64,
) {
    let mut total_tokens = 0u64;
    let mut waiters = lane.waiters.lock().expect("lane lock poisoned");
    for (request, mut response) in batch.requests.iter().zip(responses) {
        response.request_id = request.id;
        if response.model_used.is_empty() {
            response.model_used = model.id.clone();
        }
        if response.usage.total_tokens == 0 {
            response.usage.total_tokens =
                response.usage.prompt_tokens + response.usage.completion_tokens;
        }
        if response.usage.cost_usd == 0.0 {
            response.usage.cost_usd = inner.calculator.calculate(
                model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
            );
        }
        if response.inference_time_ms == 0 {
            response.inference_time_ms = inference_time_ms;
        }
        total_tokens += u64::from(response.usage.total_tokens);

        metrics::counter!(
            telemetry::TOKENS_TOTAL,
            "model" => model.id.clone(),
            "direction" => "prompt",
        )
        .increment(u64::from(response.usage.prompt_tokens));
        metrics::counter!(
            telemetry::TOKENS_TOTAL,
            "model" => model.id.clone(),
            "direction" => "completion",
        )
        .increment(u64::from(response.usage.completion_tokens));

        if let Some(waiter) = waiters.remove(&request.id) {
            let _ = waiter.tx.send(Ok(response));
        } else {
            // Caller disconnected while queued; drop its response.
            debug!(request_id = %request.id, "no waiter for response");
        }
    }
    drop(waiters);

    if let Some(prefix) = &batch.common_prefix {
        inner.caches.insert_prefix(prefix, None);
    }

    let processing_secs = (inference_time_ms as f64 / 1000.0).max(1e-3);
    let batch_metrics = BatchMetrics {
        batch_id: batch.id,
        size: batch.size(),
        total_tokens,
        processing_time_ms: inference_time_ms,
        wait_time_ms,
        throughput_tokens_per_sec: total_tokens as f64 / processing_secs,
        efficiency_score: batch.size() as f64 / batch.strategy.max_batch_size as f64,
    };
    lane.batcher.record_batch_metrics(&batch_metrics);

    metrics::counter!(telemetry::BATCHES_TOTAL, "lane" => batch.priority().as_str())
        .increment(1);
    metrics::histogram!(telemetry::BATCH_SIZE).record(batch.size() as f64);
    info!(
        batch_id = %batch.id,
        model = model.id,
        size = batch.size(),
        inference_time_ms,
        "batch completed"
    );
    batch.mark_completed();
}

fn record_success(inner: &Arc<EngineInner>, model: &ModelConfig) {
    if inner.breakers.record_success(&model.id) {
        inner.router.update_model_health(&model.id, true, false);
    }
}

fn record_failure(inner: &Arc<EngineInner>, model: &ModelConfig) {
    if inner.breakers.record_failure(&model.id) {
        inner
            .router
            .update_model_health(&model.id, model.healthy, true);
    }
}
