// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for docstore.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `docstore_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `layer`: queue, cache, durable, rpc
//! - `operation`: get, fetch, update, remove, all, count, flush
//! - `status`: hit, miss, success, error

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store operation outcome
pub fn record_operation(layer: &str, operation: &str, status: &str) {
    counter!(
        "docstore_operations_total",
        "layer" => layer.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(layer: &str, operation: &str, duration: Duration) {
    histogram!(
        "docstore_operation_seconds",
        "layer" => layer.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the outcome of a flush run
pub fn record_flush(persisted: usize, failed: usize) {
    counter!("docstore_flush_persisted_total").increment(persisted as u64);
    counter!("docstore_flush_failed_total").increment(failed as u64);
}

/// Set the current number of dirty entries in the write queue
pub fn set_queue_entries(count: usize) {
    gauge!("docstore_queue_entries").set(count as f64);
}
