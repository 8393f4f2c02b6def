//! Metrics recording.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): processed requests by method, status
//! - `dispatch_request_duration_seconds` (histogram): time from hand-over to finalization
//! - `dispatch_rejected_total` (counter): requests refused by admission control
//! - `dispatch_queue_depth` (gauge): requests waiting for a worker
//! - `dispatch_handler_failures_total` (counter): handler errors and panics
//! - `dispatch_workers_abandoned_total` (counter): workers detached at forced stop
//! - `dispatch_active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - Only the `metrics` facade is used; the embedding application installs a recorder
//! - Without a recorder every call is a no-op

use std::time::Duration;

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "dispatch_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("dispatch_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rejected() {
    metrics::counter!("dispatch_rejected_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    metrics::gauge!("dispatch_queue_depth").set(depth as f64);
}

pub fn record_handler_failure(kind: &'static str) {
    metrics::counter!("dispatch_handler_failures_total", "kind" => kind).increment(1);
}

pub fn record_workers_abandoned(count: usize) {
    metrics::counter!("dispatch_workers_abandoned_total").increment(count as u64);
}

pub fn record_active_connections(count: usize) {
    metrics::gauge!("dispatch_active_connections").set(count as f64);
}
