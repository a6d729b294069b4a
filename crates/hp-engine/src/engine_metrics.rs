//! Metrics for the dispatch engine
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the
//! embedding binary installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the classified outcome of a delivery attempt
pub fn record_delivery(outcome: &str) {
    counter!(
        "hp_deliveries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record time spent waiting on a rate limit
pub fn record_rate_limit_wait(wait: Duration) {
    counter!("hp_rate_limited_total").increment(1);
    histogram!("hp_rate_limit_wait_seconds").record(wait.as_secs_f64());
}

pub fn record_endpoint_created() {
    counter!("hp_endpoints_created_total").increment(1);
}

pub fn record_endpoint_creation_failed() {
    counter!("hp_endpoint_creation_failures_total").increment(1);
}

/// Record an endpoint dropped after a permanent delivery failure
pub fn record_endpoint_removed(status: u16) {
    counter!(
        "hp_endpoints_removed_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_persist_failure() {
    counter!("hp_persist_failures_total").increment(1);
}

pub fn set_registry_size(size: usize) {
    gauge!("hp_registry_endpoints").set(size as f64);
}

pub fn set_active_loops(count: usize) {
    gauge!("hp_active_dispatch_loops").set(count as f64);
}

/// Record the duration and deferred backlog of a reconciliation pass
pub fn record_pass(duration: Duration, deferred: usize) {
    histogram!("hp_reconcile_pass_seconds").record(duration.as_secs_f64());
    gauge!("hp_deferred_creations").set(deferred as f64);
}
