//! Metrics collection and exposition.
//!
//! # Metrics
//! - `umami_injections_total{outcome}` (counter): HTML interception outcomes
//! - `umami_forward_requests_total{status}` (counter): collector forwards by status
//! - `umami_beacons_total{outcome}` (counter): server-side beacons by outcome
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_injection(outcome: &str) {
    metrics::counter!("umami_injections_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_forward(status: u16) {
    metrics::counter!("umami_forward_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_beacon(outcome: &str) {
    metrics::counter!("umami_beacons_total", "outcome" => outcome.to_string()).increment(1);
}
