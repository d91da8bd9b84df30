//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): dispatched requests by method, status
//! - `gateway_request_duration_seconds` (histogram): dispatch latency
//! - `gateway_route_reloads_total` (counter): routing cache reloads
//! - `gateway_routes_loaded` (gauge): endpoints in the current snapshot
//! - `gateway_filter_lookups_total` (counter): filter lookups by outcome
//! - `gateway_registrations_total` (counter): registrations by outcome
//! - `gateway_microservices` (gauge): microservices by status

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_route_reload(endpoints: usize) {
    counter!("gateway_route_reloads_total").increment(1);
    gauge!("gateway_routes_loaded").set(endpoints as f64);
}

pub fn record_filter_lookup(outcome: &'static str) {
    counter!("gateway_filter_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_registration(outcome: &'static str) {
    counter!("gateway_registrations_total", "outcome" => outcome).increment(1);
}

pub fn record_microservices(status: &'static str, count: usize) {
    gauge!("gateway_microservices", "status" => status).set(count as f64);
}
