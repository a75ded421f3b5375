//! Prometheus metrics for the gateway
//!
//! Exports metrics for:
//! - Request latency per route
//! - Rows serialized and decode failures per endpoint
//! - Schema refreshes

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

// ═══════════════════════════════════════════════════════════════════════════
// REQUEST METRICS
// ═══════════════════════════════════════════════════════════════════════════

/// Request latency by route and status
pub static REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pgexpose_request_duration_seconds",
        "Time until the response status is known, in seconds",
        &["route", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════
// SERIALIZATION METRICS
// ═══════════════════════════════════════════════════════════════════════════

/// Rows written to response bodies
pub static ROWS_SERIALIZED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pgexpose_rows_serialized_total",
        "Total rows serialized to JSON",
        &["endpoint"]
    )
    .unwrap()
});

/// Values that could not be decoded against their declared type
pub static DECODE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pgexpose_decode_failures_total",
        "Total composite/array decode failures",
        &["endpoint"]
    )
    .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════
// SCHEMA METRICS
// ═══════════════════════════════════════════════════════════════════════════

/// Schema introspection runs by outcome
pub static SCHEMA_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pgexpose_schema_refresh_total",
        "Schema introspection runs",
        &["status"]
    )
    .unwrap()
});

/// Endpoints in the current snapshot
pub static ENDPOINTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pgexpose_endpoints_active",
        "Endpoints exposed by the current schema snapshot"
    )
    .unwrap()
});

/// Register all metrics
pub fn init_metrics() {
    let _ = &*REQUEST_DURATION_SECONDS;
    let _ = &*ROWS_SERIALIZED_TOTAL;
    let _ = &*DECODE_FAILURES_TOTAL;
    let _ = &*SCHEMA_REFRESH_TOTAL;
    let _ = &*ENDPOINTS_ACTIVE;
}

/// Text exposition of the default registry
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    REQUEST_DURATION_SECONDS
        .with_label_values(&[route, status.as_str()])
        .observe(duration_secs);
}

pub fn record_rows_serialized(endpoint: &str, rows: u64) {
    ROWS_SERIALIZED_TOTAL
        .with_label_values(&[endpoint])
        .inc_by(rows as f64);
}

pub fn record_decode_failure(endpoint: &str) {
    DECODE_FAILURES_TOTAL.with_label_values(&[endpoint]).inc();
}

pub fn record_schema_refresh(success: bool, endpoints: usize) {
    let status = if success { "success" } else { "error" };
    SCHEMA_REFRESH_TOTAL.with_label_values(&[status]).inc();
    if success {
        ENDPOINTS_ACTIVE.set(endpoints as i64);
    }
}
