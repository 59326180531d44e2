//! Telemetry metric name constants.
//!
//! Centralised metric names for costwise operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `costwise_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — model id (e.g. "gpt-3.5", "local-vllm")
//! - `tier` — cache tier: "exact" | "semantic" | "prefix"
//! - `lane` — priority lane: "express" | "standard" | "batch"
//! - `status` — outcome: "ok" or "error"
//! - `direction` — token direction: "prompt" or "completion"

/// Total inference requests accepted by the engine.
///
/// Labels: `model`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "costwise_requests_total";

/// End-to-end request duration in seconds.
///
/// Labels: `model`.
pub const REQUEST_DURATION_SECONDS: &str = "costwise_request_duration_seconds";

/// Total cache hits.
///
/// Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "costwise_cache_hits_total";

/// Total cache misses (counted once per hierarchy probe).
pub const CACHE_MISSES_TOTAL: &str = "costwise_cache_misses_total";

/// Total cache evictions.
///
/// Labels: `tier`.
pub const CACHE_EVICTIONS_TOTAL: &str = "costwise_cache_evictions_total";

/// Total batches dispatched.
///
/// Labels: `lane`.
pub const BATCHES_TOTAL: &str = "costwise_batches_total";

/// Size of dispatched batches.
pub const BATCH_SIZE: &str = "costwise_batch_size";

/// Total routing decisions made.
///
/// Labels: `model`, `strategy`.
pub const ROUTING_DECISIONS_TOTAL: &str = "costwise_routing_decisions_total";

/// Total dispatch retries (not counting the initial attempt).
///
/// Labels: `model`.
pub const DISPATCH_RETRIES_TOTAL: &str = "costwise_dispatch_retries_total";

/// Total circuit breaker open events.
///
/// Labels: `model`.
pub const BREAKER_OPENED_TOTAL: &str = "costwise_breaker_opened_total";

/// Total tokens consumed on backend dispatches.
///
/// Labels: `model`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "costwise_tokens_total";

/// Per-request net cost in USD.
///
/// Labels: `model`.
pub const REQUEST_COST_USD: &str = "costwise_request_cost_usd";

/// Total requests rejected by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "costwise_rate_limited_total";
