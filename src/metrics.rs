/// Prometheus metrics
///
/// Counters for the two hot paths: credential verification and telemetry
/// ingestion. Exposed as text on GET /metrics.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Login attempts by outcome (success, invalid, inactive, unavailable)
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "login_attempts_total",
        "Total number of login attempts",
        &["outcome"]
    )
    .unwrap();

    /// Telemetry records stored, by source
    pub static ref TELEMETRY_INGESTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "telemetry_ingested_total",
        "Total number of telemetry records stored",
        &["source"]
    )
    .unwrap();

    /// Inbound messages dropped, by reason
    pub static ref TELEMETRY_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "telemetry_dropped_total",
        "Total number of inbound messages dropped",
        &["reason"]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
