//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): origin round trip latency
//! - `proxy_tunnels_total` (counter): CONNECT outcomes
//! - `proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//!
//! Recording is a no-op until a recorder is installed, so the core can
//! report unconditionally.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_request_failure(method: &str, status: u16) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_tunnel(outcome: &'static str) {
    metrics::counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_relay_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => direction).increment(bytes);
}
