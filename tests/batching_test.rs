//! Batching behaviour across the three batcher variants.

use costwise::{
    AdaptiveBatcher, Batcher, BatchStrategy, InferenceRequest, PriorityBatcher, Priority,
};

fn request(prompt: &str, priority: Priority) -> InferenceRequest {
    InferenceRequest::builder()
        .prompt(prompt)
        .priority(priority)
        .build()
        .unwrap()
}

// ============================================================================
// Strategy validation
// ============================================================================

#[test]
fn strategy_rejects_min_above_max() {
    assert!(BatchStrategy::new(10, 5).is_err());
}

#[test]
fn strategy_defaults() {
    let strategy = BatchStrategy::default();
    assert_eq!(strategy.min_batch_size, 4);
    assert_eq!(strategy.max_batch_size, 64);
    assert_eq!(strategy.max_wait_ms, 50);
    assert_eq!(strategy.express_max_wait_ms, 10);
}

// ============================================================================
// Adaptive batcher
// ============================================================================

#[tokio::test]
async fn five_standard_requests_form_one_bounded_batch() {
    let batcher = AdaptiveBatcher::new(BatchStrategy::new(2, 10).unwrap());
    for i in 0..5 {
        batcher
            .add_request(request(&format!("Question {i}"), Priority::Standard))
            .await
            .unwrap();
    }

    let batch = batcher.collect_batch().await.unwrap().unwrap();
    assert!(batch.size() >= 2);
    assert!(batch.size() <= 10);
}

#[tokio::test]
async fn express_submitted_after_standard_is_emitted_first() {
    let batcher = AdaptiveBatcher::new(BatchStrategy::new(2, 10).unwrap());
    for i in 0..3 {
        batcher
            .add_request(request(&format!("Standard {i}"), Priority::Standard))
            .await
            .unwrap();
    }
    batcher
        .add_request(request("Express query", Priority::Express))
        .await
        .unwrap();

    let first = batcher.collect_batch().await.unwrap().unwrap();
    assert_eq!(first.priority(), Priority::Express);
    assert!(first.size() <= 4);
}

#[tokio::test]
async fn no_later_standard_overtakes_an_express_request() {
    let batcher = AdaptiveBatcher::new(BatchStrategy::new(1, 10).unwrap());
    batcher
        .add_request(request("express", Priority::Express))
        .await
        .unwrap();
    for i in 0..5 {
        batcher
            .add_request(request(&format!("later standard {i}"), Priority::Standard))
            .await
            .unwrap();
    }

    // Emit everything; the express request must be in the first batch.
    let first = batcher.collect_batch().await.unwrap().unwrap();
    assert_eq!(first.priority(), Priority::Express);
    assert!(first.requests.iter().any(|r| r.prompt == "express"));
}

#[tokio::test]
async fn empty_batcher_emits_nothing() {
    let batcher = AdaptiveBatcher::new(BatchStrategy::new(2, 10).unwrap());
    assert!(batcher.collect_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn equal_min_max_emits_exactly_that_size_under_load() {
    let batcher = AdaptiveBatcher::new(BatchStrategy::new(4, 4).unwrap());
    for i in 0..9 {
        batcher
            .add_request(request(&format!("q{i}"), Priority::Standard))
            .await
            .unwrap();
    }
    let first = batcher.collect_batch().await.unwrap().unwrap();
    let second = batcher.collect_batch().await.unwrap().unwrap();
    assert_eq!(first.size(), 4);
    assert_eq!(second.size(), 4);
}

#[tokio::test(start_paused = true)]
async fn aged_requests_force_a_small_batch() {
    let batcher = AdaptiveBatcher::new(
        BatchStrategy::new(4, 16).unwrap().max_wait_ms(50),
    );
    batcher
        .add_request(request("stale", Priority::Standard))
        .await
        .unwrap();
    assert!(batcher.collect_batch().await.unwrap().is_none());

    tokio::time::advance(std::time::Duration::from_millis(60)).await;
    let batch = batcher.collect_batch().await.unwrap().unwrap();
    assert_eq!(batch.size(), 1);
}

// ============================================================================
// Priority batcher
// ============================================================================

#[tokio::test]
async fn strict_lanes_never_mix_priorities() {
    let batcher = PriorityBatcher::new(BatchStrategy::new(1, 8).unwrap());
    batcher.add_request(request("A", Priority::Standard)).await.unwrap();
    batcher.add_request(request("B", Priority::Express)).await.unwrap();
    batcher.add_request(request("C", Priority::Batch)).await.unwrap();

    let batch = batcher.collect_batch().await.unwrap().unwrap();
    assert_eq!(batch.priority(), Priority::Express);
    assert_eq!(batch.size(), 1);
}

#[tokio::test]
async fn queue_stats_track_depth_per_lane() {
    let batcher = PriorityBatcher::new(BatchStrategy::new(1, 8).unwrap());
    batcher.add_request(request("A", Priority::Standard)).await.unwrap();
    batcher.add_request(request("B", Priority::Standard)).await.unwrap();
    batcher.add_request(request("C", Priority::Batch)).await.unwrap();

    let stats = batcher.queue_stats();
    assert_eq!(stats.standard, 2);
    assert_eq!(stats.batch, 1);
    assert_eq!(stats.express, 0);
    assert_eq!(stats.total, 3);
}
