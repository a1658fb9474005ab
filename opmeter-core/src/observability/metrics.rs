//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration
//!
//! Without an installed recorder every update is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Measurement lifecycle
    describe_counter!(
        "opmeter_measurements_total",
        "Total number of completed measurements (by outcome: success, failure)"
    );
    describe_histogram!(
        "opmeter_measurement_duration_seconds",
        "Wall-clock duration of measured operations (by operation)"
    );
    describe_counter!(
        "opmeter_measurements_cancelled_total",
        "Total number of measurements abandoned without a record"
    );
    describe_counter!(
        "opmeter_records_lost_total",
        "Total number of finished measurements whose record could not be saved"
    );

    // Database
    describe_counter!("opmeter_db_errors_total", "Total database failures (by operation)");
}

/// Helper functions for common metric patterns
pub fn record_measurement(operation: &str, duration_secs: f64, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("opmeter_measurements_total", "outcome" => outcome).increment(1);
    histogram!("opmeter_measurement_duration_seconds", "operation" => operation.to_string())
        .record(duration_secs);
}

pub fn record_cancelled() {
    counter!("opmeter_measurements_cancelled_total").increment(1);
}

pub fn record_lost(operation: &str) {
    counter!("opmeter_records_lost_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_db_error(operation: &'static str) {
    counter!("opmeter_db_errors_total", "operation" => operation).increment(1);
}
