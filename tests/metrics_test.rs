//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::MetricKind;

use costwise::telemetry;
use costwise::{ExactCache, InferenceRequest, InferenceResponse};

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn request(prompt: &str) -> InferenceRequest {
    InferenceRequest::builder().prompt(prompt).build().unwrap()
}

fn response(request: &InferenceRequest) -> InferenceResponse {
    InferenceResponse::new(request.id, "cached answer", "test-model")
}

#[test]
fn cache_hits_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let cache = ExactCache::new(100);
        let req = request("counted");
        cache.insert(&req, &response(&req));
        assert!(cache.get(&req).is_some());
        assert!(cache.get(&req).is_some());
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 2);
}

#[test]
fn evictions_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let cache = ExactCache::new(1);
        for i in 0..3 {
            let req = request(&format!("q{i}"));
            cache.insert(&req, &response(&req));
        }
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_EVICTIONS_TOTAL), 2);
}

#[test]
fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let cache = ExactCache::new(10);
    let req = request("no recorder");
    cache.insert(&req, &response(&req));
    let _ = cache.get(&req);
}
