//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (publishes, provisioning, fallback writes, HTTP exchanges)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `telemetry_messages_published_total` (counter): publishes by channel, outcome
//! - `telemetry_channel_provision_total` (counter): declares by channel, outcome
//! - `telemetry_fallback_writes_total` (counter): fallback file writes by outcome
//! - `telemetry_http_exchanges_total` (counter): logged exchanges by bucket, slow
//! - `telemetry_http_exchange_duration_seconds` (histogram): handler latency
//! - `telemetry_broker_connected` (gauge): 1=connected, 0=degraded
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users and
//!   tests pay nothing
//! - Labels are low-cardinality (channel names, status buckets)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Returns `false` if the exporter could not be installed (e.g. already installed).
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
            false
        }
    }
}

fn describe_metrics() {
    describe_counter!(
        "telemetry_messages_published_total",
        "Messages handed to the broker, by channel and outcome"
    );
    describe_counter!(
        "telemetry_channel_provision_total",
        "Channel declarations, by channel and outcome"
    );
    describe_counter!(
        "telemetry_fallback_writes_total",
        "Records appended to the local fallback file, by outcome"
    );
    describe_counter!(
        "telemetry_http_exchanges_total",
        "HTTP exchanges captured by the interceptor"
    );
    describe_histogram!(
        "telemetry_http_exchange_duration_seconds",
        "Handler latency of captured HTTP exchanges"
    );
    describe_gauge!(
        "telemetry_broker_connected",
        "Whether the delivery manager is connected to the broker"
    );
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_publish(channel: &str, ok: bool) {
    counter!(
        "telemetry_messages_published_total",
        "channel" => channel.to_string(),
        "outcome" => outcome(ok),
    )
    .increment(1);
}

pub fn record_provision(channel: &str, ok: bool) {
    counter!(
        "telemetry_channel_provision_total",
        "channel" => channel.to_string(),
        "outcome" => outcome(ok),
    )
    .increment(1);
}

pub fn record_fallback_write(ok: bool) {
    counter!("telemetry_fallback_writes_total", "outcome" => outcome(ok)).increment(1);
}

pub fn set_broker_connected(connected: bool) {
    gauge!("telemetry_broker_connected").set(if connected { 1.0 } else { 0.0 });
}

pub fn record_http_exchange(bucket: &'static str, slow: bool, duration: Duration) {
    counter!(
        "telemetry_http_exchanges_total",
        "bucket" => bucket,
        "slow" => if slow { "true" } else { "false" },
    )
    .increment(1);
    histogram!("telemetry_http_exchange_duration_seconds").record(duration.as_secs_f64());
}
