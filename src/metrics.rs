//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Records received and requests built
//! - Loop prevention skips
//! - Batch writes and their failures
//! - Retry rounds and backoff
//! - Invocation outcomes
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record change records received in an invocation (before normalization).
pub fn record_records_received(table: &str, received: usize, kept: usize) {
    counter!("replication_records_received_total", "table" => table.to_string())
        .increment(received as u64);
    counter!("replication_records_dropped_total", "table" => table.to_string())
        .increment(received.saturating_sub(kept) as u64);
}

/// Record write requests built from change records.
pub fn record_requests_built(table: &str, count: usize) {
    counter!("replication_requests_built_total", "table" => table.to_string())
        .increment(count as u64);
}

/// Record a record skipped by loop prevention.
pub fn record_loop_skipped(table: &str) {
    counter!("replication_loop_skipped_total", "table" => table.to_string()).increment(1);
}

/// Record one bulk write call.
pub fn record_batch_write(table: &str, size: usize, duration: Duration) {
    counter!("replication_batches_written_total", "table" => table.to_string()).increment(1);
    histogram!("replication_batch_size", "table" => table.to_string()).record(size as f64);
    histogram!("replication_batch_write_duration_seconds", "table" => table.to_string())
        .record(duration.as_secs_f64());
}

/// Record entries of a batch that must be retried.
pub fn record_batch_failure(table: &str, cause: &str, failed: usize) {
    counter!(
        "replication_batch_failures_total",
        "table" => table.to_string(),
        "cause" => cause.to_string()
    )
    .increment(1);
    counter!(
        "replication_failed_requests_total",
        "table" => table.to_string(),
        "cause" => cause.to_string()
    )
    .increment(failed as u64);
}

/// Record unprocessed items that matched no submitted request.
pub fn record_unmatched_unprocessed(table: &str, count: usize) {
    counter!("replication_unmatched_unprocessed_total", "table" => table.to_string())
        .increment(count as u64);
}

/// Record the start of a retry round.
pub fn record_round(table: &str, attempt: u32, batches: usize) {
    counter!("replication_rounds_total", "table" => table.to_string()).increment(1);
    gauge!("replication_round_attempt", "table" => table.to_string()).set(attempt as f64);
    histogram!("replication_round_batches", "table" => table.to_string()).record(batches as f64);
}

/// Record a backoff sleep between rounds.
pub fn record_backoff(table: &str, delay: Duration) {
    histogram!("replication_backoff_seconds", "table" => table.to_string())
        .record(delay.as_secs_f64());
}

/// Record the outcome of an invocation.
pub fn record_invocation(table: &str, outcome: &str, records: usize, duration: Duration) {
    counter!(
        "replication_invocations_total",
        "table" => table.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    counter!(
        "replication_records_handled_total",
        "table" => table.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(records as u64);
    histogram!("replication_invocation_duration_seconds", "table" => table.to_string())
        .record(duration.as_secs_f64());
}

/// Record reconcile items stamped with a sync marker.
pub fn record_reconcile_stamped(table: &str, side: &str, count: usize) {
    counter!(
        "replication_reconcile_stamped_total",
        "table" => table.to_string(),
        "side" => side.to_string()
    )
    .increment(count as u64);
}
