//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Trades**: received per symbol, published, publish failures
//! - **Decoding**: dropped messages by decode failure kind
//! - **Connections**: dial attempts, dial failures, reconnects per symbol
//! - **Streaming**: number of symbols with a live connection
//! - **Latency**: bus publish duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns `BuildError` if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
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
    // Trade counters
    describe_counter!(
        "trade_ingestion_trades_received_total",
        "Trades decoded from the upstream feed and queued for publishing"
    );
    describe_counter!(
        "trade_ingestion_trades_published_total",
        "Trades accepted by the bus"
    );
    describe_counter!(
        "trade_ingestion_publish_failures_total",
        "Trades dropped because the bus publish failed"
    );
    describe_counter!(
        "trade_ingestion_decode_errors_total",
        "Upstream messages dropped because they could not be decoded"
    );

    // Connection counters
    describe_counter!(
        "trade_ingestion_connect_attempts_total",
        "Upstream dial attempts"
    );
    describe_counter!(
        "trade_ingestion_connect_failures_total",
        "Failed upstream dial attempts"
    );
    describe_counter!(
        "trade_ingestion_reconnects_total",
        "Established upstream connections that dropped"
    );

    // Connection gauges
    describe_gauge!(
        "trade_ingestion_streaming_symbols",
        "Number of symbols with a live upstream connection"
    );

    // Latency histograms
    describe_histogram!(
        "trade_ingestion_publish_seconds",
        "Time to publish one trade to the bus"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded trade handed to the merged queue.
pub fn record_trade_received(symbol: &str) {
    counter!(
        "trade_ingestion_trades_received_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a dropped, undecodable upstream message.
pub fn record_decode_error(kind: &'static str) {
    counter!("trade_ingestion_decode_errors_total", "kind" => kind).increment(1);
}

/// Record a trade accepted by the bus.
pub fn record_trade_published() {
    counter!("trade_ingestion_trades_published_total").increment(1);
}

/// Record a failed bus publish.
pub fn record_publish_failure() {
    counter!("trade_ingestion_publish_failures_total").increment(1);
}

/// Record a dial attempt.
pub fn record_connect_attempt(symbol: &str) {
    counter!(
        "trade_ingestion_connect_attempts_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a failed dial.
pub fn record_connect_failure(symbol: &str) {
    counter!(
        "trade_ingestion_connect_failures_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a dropped connection.
pub fn record_reconnect(symbol: &str) {
    counter!(
        "trade_ingestion_reconnects_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// A symbol's connection went live.
pub fn increment_streaming_symbols() {
    gauge!("trade_ingestion_streaming_symbols").increment(1.0);
}

/// A symbol's live connection ended.
pub fn decrement_streaming_symbols() {
    gauge!("trade_ingestion_streaming_symbols").decrement(1.0);
}

/// Record bus publish duration.
pub fn record_publish_duration(duration: Duration) {
    histogram!("trade_ingestion_publish_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
