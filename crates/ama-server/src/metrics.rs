//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use ama_core::{BroadcastObserver, BroadcastReport, Event, Registry};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "ama_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "ama_connections_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "ama_subscriptions_total";
    pub const NOTIFICATIONS_TOTAL: &str = "ama_notifications_total";
    pub const NOTIFICATIONS_DROPPED: &str = "ama_notifications_dropped_total";
    pub const DELIVERIES_TOTAL: &str = "ama_deliveries_total";
    pub const EVICTIONS_TOTAL: &str = "ama_evictions_total";
    pub const ROOMS_ACTIVE: &str = "ama_rooms_active";
    pub const BROADCAST_SECONDS: &str = "ama_broadcast_seconds";
    pub const ERRORS_TOTAL: &str = "ama_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of subscriber connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of subscriber connections"
    );
    metrics::describe_counter!(
        names::SUBSCRIPTIONS_TOTAL,
        "Total number of room subscriptions"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_TOTAL,
        "Total number of notifications broadcast, by category"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_DROPPED,
        "Notifications dropped before broadcast"
    );
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Successful deliveries");
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Subscribers evicted after a failed delivery"
    );
    metrics::describe_gauge!(
        names::ROOMS_ACTIVE,
        "Rooms with at least one subscriber"
    );
    metrics::describe_histogram!(
        names::BROADCAST_SECONDS,
        "Time to fan one notification out to a room"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

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

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a subscription.
pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Record a notification that never reached the broadcaster.
pub fn record_dropped(reason: &'static str) {
    counter!(names::NOTIFICATIONS_DROPPED, "reason" => reason).increment(1);
}

/// Update active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Records the outcome of every broadcast.
pub struct BroadcastMetrics {
    registry: Arc<Registry>,
}

impl BroadcastMetrics {
    /// Create an observer reporting on `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl BroadcastObserver for BroadcastMetrics {
    fn on_broadcast(&self, event: &Event, report: &BroadcastReport, elapsed: Duration) {
        counter!(names::NOTIFICATIONS_TOTAL, "category" => event.category().as_str())
            .increment(1);
        counter!(names::DELIVERIES_TOTAL).increment(report.delivered as u64);
        histogram!(names::BROADCAST_SECONDS).record(elapsed.as_secs_f64());

        if report.evicted > 0 {
            counter!(names::EVICTIONS_TOTAL).increment(report.evicted as u64);
            set_active_rooms(self.registry.stats().room_count);
        }
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
