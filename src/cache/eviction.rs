//! Pluggable cache eviction policies.
//!
//! Shared by the cache tiers: each policy selects a victim among live
//! entries. Modeled as a variant tag rather than a trait object — the
//! policy set is closed and the selection logic is a handful of
//! comparisons.

use serde::{Deserialize, Serialize};

use crate::types::CacheEntry;

/// Guard against division by a zero age in the cost-aware score.
const MIN_AGE_SECONDS: f64 = 1e-6;

/// Cache eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the least recently used entry.
    Lru,
    /// Evict the least frequently used entry.
    Lfu,
    /// Evict expired entries first (oldest first), else the oldest entry.
    Ttl,
    /// Evict the entry with the worst realized savings per second of
    /// residency; ties go to the oldest entry.
    CostAware,
}

impl EvictionPolicy {
    /// Pick the entry to evict. Returns its key in `entries`, or `None`
    /// when there is nothing to evict.
    pub fn select_victim<'a, I>(&self, entries: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = (&'a str, &'a CacheEntry)>,
    {
        match self {
            EvictionPolicy::Lru => entries
                .into_iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k),
            EvictionPolicy::Lfu => entries
                .into_iter()
                .min_by_key(|(_, e)| e.access_count)
                .map(|(k, _)| k),
            EvictionPolicy::Ttl => {
                let all: Vec<_> = entries.into_iter().collect();
                let expired = all
                    .iter()
                    .filter(|(_, e)| e.is_expired())
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(k, _)| *k);
                expired.or_else(|| {
                    all.into_iter()
                        .min_by_key(|(_, e)| e.created_at)
                        .map(|(k, _)| k)
                })
            }
            EvictionPolicy::CostAware => entries
                .into_iter()
                .min_by(|(_, a), (_, b)| {
                    benefit_per_second(a)
                        .total_cmp(&benefit_per_second(b))
                        .then_with(|| a.created_at.cmp(&b.created_at))
                })
                .map(|(k, _)| k),
        }
    }
}

/// Realized dollar savings per second of cache residency.
fn benefit_per_second(entry: &CacheEntry) -> f64 {
    entry.cost_savings() / entry.age_seconds().max(MIN_AGE_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CacheKey, CacheStrategy};
    use std::time::Duration;
    use tokio::time::Instant;

    fn entry(name: &str) -> CacheEntry {
        CacheEntry::new(
            CacheKey {
                content_hash: name.into(),
                model: "default".into(),
                temperature: 0.7,
                max_tokens: 100,
            },
            "prompt",
            "response",
            CacheStrategy::Exact,
        )
    }

    fn aged(name: &str, age: Duration) -> CacheEntry {
        let mut e = entry(name);
        e.created_at = Instant::now() - age;
        e.last_accessed = e.created_at;
        e
    }

    #[test]
    fn lru_picks_least_recently_accessed() {
        let mut a = aged("a", Duration::from_secs(100));
        let b = aged("b", Duration::from_secs(50));
        a.touch(); // a is now fresher than b
        let entries = [("a", &a), ("b", &b)];
        let victim = EvictionPolicy::Lru
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "b");
    }

    #[test]
    fn lfu_picks_least_frequently_accessed() {
        let mut a = entry("a");
        let b = entry("b");
        a.touch();
        a.touch();
        let entries = [("a", &a), ("b", &b)];
        let victim = EvictionPolicy::Lfu
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "b");
    }

    #[test]
    fn ttl_prefers_expired_entries() {
        let mut expired = aged("expired", Duration::from_secs(100));
        expired.ttl_seconds = Some(10);
        let old_but_live = aged("live", Duration::from_secs(500));
        let entries = [("expired", &expired), ("live", &old_but_live)];
        let victim = EvictionPolicy::Ttl
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "expired");
    }

    #[test]
    fn ttl_falls_back_to_oldest() {
        let newer = aged("newer", Duration::from_secs(10));
        let older = aged("older", Duration::from_secs(100));
        let entries = [("newer", &newer), ("older", &older)];
        let victim = EvictionPolicy::Ttl
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "older");
    }

    #[test]
    fn cost_aware_keeps_high_value_entries() {
        // Same age; "valuable" has realized savings, "worthless" has none.
        let mut valuable = aged("valuable", Duration::from_secs(60));
        valuable.cost_usd = 0.05;
        valuable.access_count = 10;
        let worthless = aged("worthless", Duration::from_secs(60));
        let entries = [("valuable", &valuable), ("worthless", &worthless)];
        let victim = EvictionPolicy::CostAware
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "worthless");
    }

    #[test]
    fn cost_aware_ties_break_to_oldest() {
        let older = aged("older", Duration::from_secs(120));
        let newer = aged("newer", Duration::from_secs(30));
        let entries = [("newer", &newer), ("older", &older)];
        let victim = EvictionPolicy::CostAware
            .select_victim(entries.iter().map(|(k, e)| (*k, *e)))
            .unwrap();
        assert_eq!(victim, "older");
    }

    #[test]
    fn empty_input_yields_no_victim() {
        assert!(EvictionPolicy::Lru.select_victim(std::iter::empty()).is_none());
    }
}
