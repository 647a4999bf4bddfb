//! Metrics collection and exposition.
//!
//! # Metrics
//! - `httpdump_captures_total` (counter): recorded exchanges by outcome
//! - `httpdump_capture_write_errors_total` (counter): failed sink writes by stage
//! - `httpdump_replay_requests_total` (counter): replayed requests by outcome, status
//! - `httpdump_fixtures_loaded` (gauge): exchanges in the replay index

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a tokio runtime. Failure is logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!(
        "httpdump_captures_total",
        "Exchanges passed through the capture interceptor"
    );
    describe_counter!(
        "httpdump_capture_write_errors_total",
        "Dump sink writes that failed"
    );
    describe_counter!(
        "httpdump_replay_requests_total",
        "Requests answered by the replay server"
    );
    describe_gauge!(
        "httpdump_fixtures_loaded",
        "Recorded exchanges held by the replay index"
    );
}

/// `outcome` is one of `ok`, `transport_error`, `unavailable`.
pub fn record_capture(outcome: &'static str) {
    counter!("httpdump_captures_total", "outcome" => outcome).increment(1);
}

/// `stage` names the sink that failed (`head`, `request`, `body`).
pub fn record_capture_write_error(stage: &'static str) {
    counter!("httpdump_capture_write_errors_total", "stage" => stage).increment(1);
}

pub fn record_replay(outcome: &'static str, status: u16) {
    counter!(
        "httpdump_replay_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn set_fixtures_loaded(count: usize) {
    gauge!("httpdump_fixtures_loaded").set(count as f64);
}
