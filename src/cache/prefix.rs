//! Prompt-prefix cache for KV-cache reuse.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::telemetry;
use crate::types::{CacheStats, PrefixCacheEntry};

/// Cache of common prompt prefixes.
///
/// A hit is not a full response; it carries an opaque KV-state handle the
/// backend can use to skip recomputing the prefix. Eviction is LFU
/// (smallest usage count) once capacity is exceeded.
pub struct PrefixCache {
    max_entries: usize,
    inner: Mutex<State>,
}

struct State {
    entries: HashMap<String, PrefixCacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl PrefixCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(State {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Find the stored prefix that `text` starts with.
    ///
    /// When several stored prefixes match, the longest one wins — a
    /// longer prefix means more KV state to reuse.
    pub fn get_prefix(&self, text: &str) -> Option<PrefixCacheEntry> {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        let best_hash = state
            .entries
            .values()
            .filter(|entry| text.starts_with(entry.prefix_text.as_str()))
            .max_by_key(|entry| entry.prefix_length)
            .map(|entry| entry.prefix_hash.clone());

        match best_hash {
            Some(hash) => {
                let entry = state
                    .entries
                    .get_mut(&hash)
                    .expect("matched prefix entry vanished");
                entry.touch();
                let snapshot = entry.clone();
                state.hits += 1;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "prefix").increment(1);
                debug!(
                    prefix_hash = snapshot.prefix_hash,
                    prefix_length = snapshot.prefix_length,
                    usage_count = snapshot.usage_count,
                    "prefix cache hit"
                );
                Some(snapshot)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store a prefix, with an optional backend KV-state handle.
    pub fn set_prefix(&self, prefix_text: &str, kv_states: Option<serde_json::Value>) {
        let entry = PrefixCacheEntry::new(prefix_text, kv_states);
        let hash = entry.prefix_hash.clone();
        let mut state = self.inner.lock().expect("cache lock poisoned");
        state.entries.insert(hash.clone(), entry);
        debug!(prefix_hash = hash, "prefix cached");

        while state.entries.len() > self.max_entries {
            // Ties on usage count go to the longest-idle entry.
            let victim = state
                .entries
                .values()
                .min_by_key(|e| (e.usage_count, e.last_used))
                .map(|e| e.prefix_hash.clone());
            match victim {
                Some(victim) => {
                    state.entries.remove(&victim);
                    state.evictions += 1;
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "tier" => "prefix")
                        .increment(1);
                    debug!(prefix_hash = victim, "prefix evicted");
                }
                None => break,
            }
        }
    }

    /// Delete prefixes containing `pattern`; `None` clears everything.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        match pattern {
            None => {
                let count = state.entries.len();
                state.entries.clear();
                count
            }
            Some(pattern) => {
                let doomed: Vec<String> = state
                    .entries
                    .iter()
                    .filter(|(_, e)| e.prefix_text.contains(pattern))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &doomed {
                    state.entries.remove(key);
                }
                doomed.len()
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Total tokens saved across all stored prefixes.
    pub fn total_tokens_saved(&self) -> u64 {
        let state = self.inner.lock().expect("cache lock poisoned");
        state.entries.values().map(|e| e.total_tokens_saved).sum()
    }
}
