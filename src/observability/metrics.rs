//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_engine_starts_total` (counter): engine starts by result
//! - `node_reloads_total` (counter): reloads by result
//! - `node_engine_running` (gauge): 1 while an engine is running
//! - `node_registry_users` (gauge): registered users per tag
//! - `node_user_traffic_bytes_total` (counter): user traffic by direction
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own HTTP listener

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_engine_start(ok: bool) {
    metrics::counter!("node_engine_starts_total", "result" => result_label(ok)).increment(1);
}

pub fn record_reload(ok: bool) {
    metrics::counter!("node_reloads_total", "result" => result_label(ok)).increment(1);
}

pub fn record_engine_running(running: bool) {
    metrics::gauge!("node_engine_running").set(if running { 1.0 } else { 0.0 });
}

pub fn record_registry_users(tag: &str, count: usize) {
    metrics::gauge!("node_registry_users", "tag" => tag.to_string()).set(count as f64);
}

pub fn record_user_traffic(uplink: u64, downlink: u64) {
    if uplink > 0 {
        metrics::counter!("node_user_traffic_bytes_total", "direction" => "up").increment(uplink);
    }
    if downlink > 0 {
        metrics::counter!("node_user_traffic_bytes_total", "direction" => "down").increment(downlink);
    }
}
