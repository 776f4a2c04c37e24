// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `search_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `index`: target index name
//! - `operation`: index, unindex, bulk, search, count, synchronize, truncate
//! - `status`: success, error, filtered, queued

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a completed operation
pub fn record_operation(index: &str, operation: &str, status: &str) {
    counter!(
        "search_sync_operations_total",
        "index" => index.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "search_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// BULK - Buffer depth and flush outcomes
// ═══════════════════════════════════════════════════════════════════════════

/// Set pending bulk instructions for an index target
pub fn set_bulk_pending(count: usize) {
    gauge!("search_sync_bulk_pending").set(count as f64);
}

/// Record a bulk flush and why it happened
pub fn record_bulk_flush(reason: &str, count: usize) {
    counter!(
        "search_sync_bulk_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("search_sync_bulk_batch_size").record(count as f64);
}

/// Record failed bulk items (or a whole failed request)
pub fn record_bulk_errors(kind: &str, count: usize) {
    counter!(
        "search_sync_bulk_errors_total",
        "kind" => kind.to_string()
    )
    .increment(count as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH - Queries and hydration
// ═══════════════════════════════════════════════════════════════════════════

/// Record a search result count
pub fn record_search_results(count: usize) {
    histogram!("search_sync_search_results").record(count as f64);
}

/// Record hydration: hits requested vs documents found
pub fn record_hydration(hits: usize, found: usize) {
    counter!("search_sync_hydrated_documents_total").increment(found as u64);
    counter!("search_sync_hydration_misses_total").increment(hits.saturating_sub(found) as u64);
}

/// Record a mapping generation, cached or fresh
pub fn record_mapping_generation(cached: bool) {
    let outcome = if cached { "cached" } else { "fresh" };
    counter!(
        "search_sync_mapping_generations_total",
        "outcome" => outcome
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNCHRONIZE - Full collection runs
// ═══════════════════════════════════════════════════════════════════════════

/// Set documents currently in flight during synchronize
pub fn set_synchronize_in_flight(count: usize) {
    gauge!("search_sync_synchronize_in_flight").set(count as f64);
}

/// Record one synchronized document
pub fn record_synchronize_document(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "search_sync_synchronize_documents_total",
        "status" => status
    )
    .increment(1);
}

/// Record deletes issued by a truncate
pub fn record_truncate_deletes(index: &str, count: usize) {
    counter!(
        "search_sync_truncate_deletes_total",
        "index" => index.to_string()
    )
    .increment(count as u64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API doesn't panic without an installed recorder.

    #[test]
    fn test_record_operation() {
        record_operation("posts", "index", "success");
        record_operation("posts", "unindex", "error");
        record_latency("search", Duration::from_millis(3));
    }

    #[test]
    fn test_bulk_metrics() {
        set_bulk_pending(12);
        record_bulk_flush("size", 1000);
        record_bulk_errors("item", 2);
    }

    #[test]
    fn test_search_metrics() {
        record_search_results(10);
        record_hydration(10, 8);
        record_hydration(0, 3);
        record_mapping_generation(true);
    }

    #[test]
    fn test_synchronize_metrics() {
        set_synchronize_in_flight(4);
        record_synchronize_document(true);
        record_truncate_deletes("posts", 100);
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("search");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
