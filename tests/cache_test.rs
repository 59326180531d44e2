//! Cache hierarchy behaviour: probe order, round-trips, invalidation,
//! and hit-rate accounting.

use std::sync::Arc;

use async_trait::async_trait;

use costwise::{
    CacheHierarchy, CacheLookup, CacheSource, Embedder, ExactCache, InferenceRequest,
    InferenceResponse, InMemoryVectorStore, PrefixCache, SemanticCache, SemanticCacheConfig,
    UsageMetrics,
};

/// Embedder with fixed directions so similarity is predictable.
struct DirectionEmbedder;

#[async_trait]
impl Embedder for DirectionEmbedder {
    async fn embed(&self, text: &str) -> costwise::Result<Vec<f32>> {
        if text.contains("2+2") {
            Ok(vec![0.995, 0.0999])
        } else if text.contains("math") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }

    fn dimension(&self) -> usize {
        2
    }
}

fn full_hierarchy() -> CacheHierarchy {
    let config = SemanticCacheConfig {
        vector_dimension: 2,
        similarity_threshold: 0.90,
        max_distance: 0.15,
        ..SemanticCacheConfig::default()
    };
    CacheHierarchy::new(
        ExactCache::new(100),
        Some(SemanticCache::new(
            config,
            Arc::new(DirectionEmbedder),
            Arc::new(InMemoryVectorStore::new(2)),
        )),
        Some(PrefixCache::new(100)),
    )
}

fn request(prompt: &str) -> InferenceRequest {
    InferenceRequest::builder().prompt(prompt).build().unwrap()
}

fn response(request: &InferenceRequest, text: &str) -> InferenceResponse {
    let mut r = InferenceResponse::new(request.id, text, "test-model");
    r.usage = UsageMetrics {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
        cached_tokens: 0,
        cost_usd: 0.0001,
    };
    r
}

// ============================================================================
// Probe order and round-trips
// ============================================================================

#[tokio::test]
async fn exact_hit_returns_stored_text_byte_for_byte() {
    let caches = full_hierarchy();
    let req = request("a hard math question");
    caches.insert(&req, &response(&req, "exactly this answer")).await;

    match caches.get(&req).await {
        CacheLookup::Hit(hit) => {
            assert_eq!(hit.text, "exactly this answer");
            assert_eq!(hit.cache_info.source, Some(CacheSource::Exact));
            assert_eq!(hit.cache_info.tokens_saved, 5);
        }
        other => panic!("expected exact hit, got {other:?}"),
    }
}

#[tokio::test]
async fn semantic_hit_reports_similarity_above_threshold() {
    let caches = full_hierarchy();
    let stored = request("a hard math question");
    caches.insert(&stored, &response(&stored, "forty-two")).await;

    // Different cache key, similar embedding.
    let similar = request("what is 2+2 exactly");
    match caches.get(&similar).await {
        CacheLookup::Hit(hit) => {
            assert_eq!(hit.cache_info.source, Some(CacheSource::Semantic));
            assert!(hit.cache_info.similarity_score.unwrap() >= 0.90);
            assert_eq!(hit.text, "forty-two");
        }
        other => panic!("expected semantic hit, got {other:?}"),
    }
}

#[tokio::test]
async fn prefix_hit_surfaces_as_hint() {
    let caches = full_hierarchy();
    caches.insert_prefix("You are an unrelated assistant prompt.", None);

    let req = request("You are an unrelated assistant prompt. Continue.");
    match caches.get(&req).await {
        CacheLookup::PrefixHint(prefix) => {
            assert_eq!(prefix, "You are an unrelated assistant prompt.");
        }
        other => panic!("expected prefix hint, got {other:?}"),
    }
}

// ============================================================================
// Invalidation idempotence
// ============================================================================

#[tokio::test]
async fn invalidate_all_then_get_is_a_miss_with_counters_intact() {
    let caches = full_hierarchy();
    let req = request("a hard math question");
    caches.insert(&req, &response(&req, "forty-two")).await;

    // Warm the hit counter.
    assert!(matches!(caches.get(&req).await, CacheLookup::Hit(_)));
    let hits_before = caches.stats().exact.hits;

    let deleted = caches.invalidate(None).await;
    assert!(deleted >= 1);

    assert!(matches!(caches.get(&req).await, CacheLookup::Miss));
    let stats = caches.stats();
    assert_eq!(stats.exact.hits, hits_before);
    assert!(stats.exact.misses >= 1);
}

#[tokio::test]
async fn pattern_invalidation_matches_prompt_and_response() {
    let caches = full_hierarchy();
    let keep = request("unrelated cooking topic");
    caches.insert(&keep, &response(&keep, "stir gently")).await;
    let drop = request("a hard math question");
    caches.insert(&drop, &response(&drop, "forty-two")).await;

    // Matches the dropped entry in both exact and semantic tiers.
    let deleted = caches.invalidate(Some("math")).await;
    assert_eq!(deleted, 2);
    assert!(matches!(caches.get(&drop).await, CacheLookup::Miss));
    assert!(matches!(caches.get(&keep).await, CacheLookup::Hit(_)));
}

// ============================================================================
// Hit-rate accounting
// ============================================================================

#[tokio::test]
async fn hit_rate_is_monotone_in_hits() {
    let caches = full_hierarchy();
    let req = request("a hard math question");
    caches.insert(&req, &response(&req, "forty-two")).await;

    caches.get(&request("missing one")).await;
    let low = caches.stats().exact.hit_rate();

    caches.get(&req).await;
    caches.get(&req).await;
    let high = caches.stats().exact.hit_rate();

    assert!((0.0..=1.0).contains(&low));
    assert!((0.0..=1.0).contains(&high));
    assert!(high >= low);
}
