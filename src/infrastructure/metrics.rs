//! Entity cache metrics
//!
//! Recorded through the `metrics` facade; they are no-ops until the host
//! application installs a recorder.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::domain::DomainError;

pub fn record_cache_hit(namespace: &str) {
    counter!("entity_cache_hits_total", "namespace" => namespace.to_string()).increment(1);
}

pub fn record_cache_miss(namespace: &str) {
    counter!("entity_cache_misses_total", "namespace" => namespace.to_string()).increment(1);
}

pub fn record_cache_set(namespace: &str) {
    counter!("entity_cache_sets_total", "namespace" => namespace.to_string()).increment(1);
}

pub fn record_invalidation(namespace: &str, removed: usize) {
    counter!("entity_cache_invalidations_total", "namespace" => namespace.to_string())
        .increment(1);
    counter!("entity_cache_invalidated_entries_total", "namespace" => namespace.to_string())
        .increment(removed as u64);
}

/// Request outcome label; cancellations are tracked apart from failures
pub fn outcome_label(error: Option<&DomainError>) -> &'static str {
    error.map_or("success", DomainError::kind)
}

/// Record one backend call made by an entity client
pub fn record_entity_request(namespace: &str, operation: &str, outcome: &str, duration: Duration) {
    let labels = [
        ("namespace", namespace.to_string()),
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("entity_requests_total", &labels).increment(1);
    histogram!("entity_request_duration_seconds", &labels).record(duration.as_secs_f64());
}
