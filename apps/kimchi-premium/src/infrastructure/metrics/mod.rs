//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Frames received per exchange and type, malformed frames
//! - **Connections**: Feed readiness and reconnects per exchange
//! - **Publication**: Snapshots published, ranking updates, record count
//! - **Latency**: Correlation and ranking cycle duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::ticker::Exchange;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "kimchi_messages_received_total",
        "Total decoded frames received from exchange feeds"
    );
    describe_counter!(
        "kimchi_messages_malformed_total",
        "Total frames dropped because they could not be decoded"
    );
    describe_counter!(
        "kimchi_reconnects_total",
        "Total WebSocket reconnections scheduled"
    );
    describe_counter!(
        "kimchi_snapshots_published_total",
        "Total ticker snapshots published by the throttled publisher"
    );
    describe_counter!(
        "kimchi_ranking_updates_total",
        "Total ordered-list changes emitted by the ranking engine"
    );

    describe_gauge!(
        "kimchi_feed_ready",
        "1 when the exchange feed is connected and subscribed"
    );
    describe_gauge!("kimchi_fx_rate_krw_per_usd", "Latest KRW per USD rate");
    describe_gauge!("kimchi_records", "Number of enriched market records");

    describe_histogram!(
        "kimchi_cycle_seconds",
        "Time to correlate and rank after a state change"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded frame from an exchange feed.
pub fn record_message_received(exchange: Exchange, message_type: &'static str) {
    counter!(
        "kimchi_messages_received_total",
        "exchange" => exchange.as_str(),
        "message_type" => message_type
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_malformed_message(exchange: Exchange) {
    counter!(
        "kimchi_messages_malformed_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect(exchange: Exchange) {
    counter!(
        "kimchi_reconnects_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Record a published ticker snapshot.
pub fn record_snapshot_published(exchange: Exchange) {
    counter!(
        "kimchi_snapshots_published_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Record an ordered-list change.
pub fn record_ranking_update() {
    counter!("kimchi_ranking_updates_total").increment(1);
}

/// Update feed readiness for an exchange.
pub fn set_feed_ready(exchange: Exchange, ready: bool) {
    gauge!(
        "kimchi_feed_ready",
        "exchange" => exchange.as_str()
    )
    .set(if ready { 1.0 } else { 0.0 });
}

/// Update the FX rate gauge.
pub fn set_fx_rate(rate: Decimal) {
    if let Some(value) = rate.to_f64() {
        gauge!("kimchi_fx_rate_krw_per_usd").set(value);
    }
}

/// Update the enriched record count.
pub fn set_record_count(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("kimchi_records").set(count as f64);
}

/// Record correlation and ranking duration.
pub fn record_cycle_duration(duration: Duration) {
    histogram!("kimchi_cycle_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
