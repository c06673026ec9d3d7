//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the process-wide Prometheus recorder exactly once
//! - Define server metrics and their recording helpers
//! - Render the current snapshot for the status endpoint and the pusher
//!
//! # Metrics
//! - `dbserver_connections` (gauge): live client connections
//! - `dbserver_connections_total` (counter): accepted client connections
//! - `dbserver_monitor_time_jump_back_total` (counter): wall clock moved backwards
//! - `dbserver_domain_schema_reloads_total` (counter): schema reload passes
//! - `dbserver_domain_stats_loads_total` (counter): statistics load passes
//! - `dbserver_metrics_push_failures_total` (counter): failed pushgateway deliveries

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const CONNECTIONS: &str = "dbserver_connections";
pub const CONNECTIONS_TOTAL: &str = "dbserver_connections_total";
pub const TIME_JUMP_BACK_TOTAL: &str = "dbserver_monitor_time_jump_back_total";
pub const SCHEMA_RELOADS_TOTAL: &str = "dbserver_domain_schema_reloads_total";
pub const STATS_LOADS_TOTAL: &str = "dbserver_domain_stats_loads_total";
pub const PUSH_FAILURES_TOTAL: &str = "dbserver_metrics_push_failures_total";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Something that can produce a metrics snapshot in Prometheus text format.
pub trait Gatherer: Send + Sync + 'static {
    fn gather(&self) -> String;
}

impl Gatherer for PrometheusHandle {
    fn gather(&self) -> String {
        self.render()
    }
}

/// Install the Prometheus recorder (once per process) and return its handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "Metrics recorder already installed");
            }
            describe();
            handle
        })
        .clone()
}

fn describe() {
    describe_gauge!(CONNECTIONS, "Live client connections.");
    describe_counter!(CONNECTIONS_TOTAL, "Accepted client connections.");
    describe_counter!(TIME_JUMP_BACK_TOTAL, "Counter of system time jumps backward.");
    describe_counter!(SCHEMA_RELOADS_TOTAL, "Schema reload passes.");
    describe_counter!(STATS_LOADS_TOTAL, "Statistics load passes.");
    describe_counter!(PUSH_FAILURES_TOTAL, "Failed pushgateway deliveries.");
}

pub fn record_connection_opened(active: u64) {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS).set(active as f64);
}

pub fn record_connection_closed(active: u64) {
    gauge!(CONNECTIONS).set(active as f64);
}

pub fn record_time_jump_back() {
    counter!(TIME_JUMP_BACK_TOTAL).increment(1);
}

pub fn record_schema_reload() {
    counter!(SCHEMA_RELOADS_TOTAL).increment(1);
}

pub fn record_stats_load() {
    counter!(STATS_LOADS_TOTAL).increment(1);
}

pub fn record_push_failure() {
    counter!(PUSH_FAILURES_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_renders() {
        let first = init_metrics();
        let second = init_metrics();
        record_time_jump_back();
        let rendered = second.gather();
        assert!(rendered.contains(TIME_JUMP_BACK_TOTAL), "{rendered}");
        assert!(first.render().contains(TIME_JUMP_BACK_TOTAL));
    }
}
