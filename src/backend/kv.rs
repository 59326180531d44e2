//! Key-value store contract, rate limiting, and distributed locking.
//!
//! The trait is the minimal surface the engine needs: a sliding-window
//! counter for rate limits and set-if-absent with TTL for locks. A
//! redis-backed implementation satisfies it with `ZADD`/`ZCARD` and
//! `SET NX EX`; the in-memory version here covers tests and
//! single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::telemetry;
use crate::{CostwiseError, Result};

/// Minimal key-value surface for rate limits and distributed locks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Record one event under `key` and return how many events fall
    /// inside the trailing `window`.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64>;

    /// Set `key` if absent, with a TTL. Returns whether the set won.
    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory [`KeyValueStore`].
pub struct InMemoryKeyValueStore {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    locks: Mutex<HashMap<String, Instant>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64> {
        let mut windows = self.windows.lock().expect("kv lock poisoned");
        let stamps = windows.entry(key.to_string()).or_default();
        let now = Instant::now();
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) > window {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.push_back(now);
        Ok(stamps.len() as u64)
    }

    async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut locks = self.locks.lock().expect("kv lock poisoned");
        let now = Instant::now();
        match locks.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                locks.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.locks.lock().expect("kv lock poisoned").remove(key);
        self.windows.lock().expect("kv lock poisoned").remove(key);
        Ok(())
    }
}

/// Sliding-window rate limiter over a [`KeyValueStore`].
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    requests_per_minute: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, requests_per_minute: u64) -> Self {
        Self {
            store,
            requests_per_minute,
        }
    }

    /// Record one request for `key` and fail with `RateLimited` when the
    /// one-minute window overflows.
    pub async fn check(&self, key: &str) -> Result<()> {
        let count = self
            .store
            .incr_window(&format!("ratelimit:{key}"), Duration::from_secs(60))
            .await?;
        if count > self.requests_per_minute {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            return Err(CostwiseError::RateLimited { retry_after: None });
        }
        Ok(())
    }
}

/// Cooperative lock over a [`KeyValueStore`], for work that must run at
/// most once across processes (e.g. cache warmup).
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    name: String,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            name: format!("lock:{}", name.into()),
            ttl,
        }
    }

    /// Try to take the lock without waiting.
    pub async fn try_acquire(&self) -> Result<bool> {
        self.store.set_nx(&self.name, self.ttl).await
    }

    /// Take the lock, polling until it frees up.
    pub async fn acquire(&self) -> Result<()> {
        while !self.try_acquire().await? {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    pub async fn release(&self) -> Result<()> {
        self.store.delete(&self.name).await
    }
}
