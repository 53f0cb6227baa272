//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tailnet_connections_accepted_total` (counter): connections returned by the engine
//! - `tailnet_connections_dropped_total` (counter): connections closed before hand-off, by reason
//! - `tailnet_identity_lookup_duration_seconds` (histogram): `whois` latency, by outcome
//! - `tailnet_active_connections` (gauge): connections being served
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_ACCEPTED: &str = "tailnet_connections_accepted_total";
pub const CONNECTIONS_DROPPED: &str = "tailnet_connections_dropped_total";
pub const IDENTITY_LOOKUP_DURATION: &str = "tailnet_identity_lookup_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "tailnet_active_connections";

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(CONNECTIONS_ACCEPTED, "Connections returned by the overlay engine");
    describe_counter!(CONNECTIONS_DROPPED, "Connections closed before reaching the host");
    describe_histogram!(IDENTITY_LOOKUP_DURATION, Unit::Seconds, "Peer identity lookup latency");
    describe_gauge!(ACTIVE_CONNECTIONS, "Connections currently being served");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_accepted() {
    counter!(CONNECTIONS_ACCEPTED).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!(CONNECTIONS_DROPPED, "reason" => reason).increment(1);
}

pub fn record_identity_lookup(started: Instant, outcome: &'static str) {
    histogram!(IDENTITY_LOOKUP_DURATION, "outcome" => outcome).record(started.elapsed().as_secs_f64());
}

pub fn record_connection_opened() {
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn record_connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}
