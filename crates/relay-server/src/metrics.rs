//! Metrics collection and export for the relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_adapter::{DeliveryStatus, DropReason};
use relay_core::EventKind;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const EVENTS_TOTAL: &str = "relay_events_total";
    pub const CANCELLED_TOTAL: &str = "relay_events_cancelled_total";
    pub const RESULTS_TOTAL: &str = "relay_results_total";
    pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
    pub const RELOADS_TOTAL: &str = "relay_reloads_total";
    pub const RULES_ACTIVE: &str = "relay_rules_active";
    pub const DISPATCH_SECONDS: &str = "relay_dispatch_seconds";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::EVENTS_TOTAL,
        "Inbound events received from protocol adapters"
    );
    metrics::describe_counter!(
        names::CANCELLED_TOTAL,
        "Inbound events cancelled before matching"
    );
    metrics::describe_counter!(
        names::RESULTS_TOTAL,
        "Matched rules, by whether a template produced text"
    );
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Delivery attempts by outcome");
    metrics::describe_counter!(names::RELOADS_TOTAL, "Rule table reloads by outcome");
    metrics::describe_gauge!(names::RULES_ACTIVE, "Rules in the active table");
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Time to match, render and enqueue one event"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an inbound event.
pub fn record_event(protocol: &str, kind: &EventKind) {
    counter!(
        names::EVENTS_TOTAL,
        "protocol" => protocol.to_string(),
        "kind" => kind_label(kind)
    )
    .increment(1);
}

/// Record an event that was cancelled before matching.
pub fn record_cancelled(protocol: &str) {
    counter!(names::CANCELLED_TOTAL, "protocol" => protocol.to_string()).increment(1);
}

/// Record the outcome of dispatching one event.
pub fn record_routed(rendered: usize, skipped: usize) {
    counter!(names::RESULTS_TOTAL, "outcome" => "rendered").increment(rendered as u64);
    counter!(names::RESULTS_TOTAL, "outcome" => "skipped").increment(skipped as u64);
}

/// Record dispatch latency.
pub fn record_dispatch_latency(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Record a delivery outcome.
pub fn record_delivery(protocol: &str, status: &DeliveryStatus) {
    counter!(
        names::DELIVERIES_TOTAL,
        "protocol" => protocol.to_string(),
        "status" => status_label(status)
    )
    .increment(1);
}

/// Record a reload attempt.
pub fn record_reload(ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!(names::RELOADS_TOTAL, "result" => result).increment(1);
}

/// Update the active rule count.
pub fn set_active_rules(count: usize) {
    gauge!(names::RULES_ACTIVE).set(count as f64);
}

/// Unrecognized kinds share one label so clients cannot mint new series.
fn kind_label(kind: &EventKind) -> String {
    match kind {
        EventKind::Other(_) => "other".to_string(),
        known => known.as_str().to_string(),
    }
}

fn status_label(status: &DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Failed(_) => "failed",
        DeliveryStatus::Dropped(DropReason::QueueFull) => "queue_full",
        DeliveryStatus::Dropped(DropReason::Closed) => "closed",
    }
}
