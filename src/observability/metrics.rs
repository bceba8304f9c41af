//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `inspection_interventions_total` (counter): blocked transactions by direction
//! - `inspection_rule_matches_total` (counter): rule matches by disruptiveness
//! - `inspection_body_limit_total` (counter): bodies cut at the limit by direction
//! - `webhook_deliveries_total` (counter): webhook outcomes

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::filter::Direction;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_intervention(direction: Direction) {
    counter!("inspection_interventions_total", "direction" => direction.as_str()).increment(1);
}

pub fn record_rule_match(disruptive: bool) {
    let disruptive = if disruptive { "true" } else { "false" };
    counter!("inspection_rule_matches_total", "disruptive" => disruptive).increment(1);
}

pub fn record_body_limit(direction: Direction) {
    counter!("inspection_body_limit_total", "direction" => direction.as_str()).increment(1);
}

pub fn record_webhook(outcome: &'static str) {
    counter!("webhook_deliveries_total", "outcome" => outcome).increment(1);
}
