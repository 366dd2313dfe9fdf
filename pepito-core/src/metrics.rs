// ABOUTME: Prometheus metrics for feed ingestion, fan-out delivery, and registry size
// ABOUTME: Thin wrappers over the `metrics` facade so call sites stay one-liners

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const FEED_EVENTS: &str = "pepito_feed_events_total";
pub const FEED_RECONNECTS: &str = "pepito_feed_reconnects_total";
pub const DELIVERIES: &str = "pepito_deliveries_total";
pub const CONFIGURED_TENANTS: &str = "pepito_configured_tenants";
pub const ERRORS: &str = "pepito_errors_total";

/// Install the global Prometheus recorder and return a handle for rendering.
/// Without a recorder every metric call below is a no-op.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Count a decoded feed frame by kind ("pepito", "heartbeat", "ignored", "malformed")
pub fn record_feed_event(kind: &str) {
    ::metrics::counter!(FEED_EVENTS, "kind" => kind.to_string()).increment(1);
}

pub fn record_feed_reconnect() {
    ::metrics::counter!(FEED_RECONNECTS).increment(1);
}

/// Count one per-destination delivery attempt by outcome ("delivered", "unresolved", "failed")
pub fn record_delivery(outcome: &str) {
    ::metrics::counter!(DELIVERIES, "outcome" => outcome.to_string()).increment(1);
}

pub fn set_configured_tenants(count: usize) {
    ::metrics::gauge!(CONFIGURED_TENANTS).set(count as f64);
}

pub fn record_error(kind: &str) {
    ::metrics::counter!(ERRORS, "kind" => kind.to_string()).increment(1);
}
