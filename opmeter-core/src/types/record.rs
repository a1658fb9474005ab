//! Measurement records and per-operation aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted outcome of one completed measurement.
///
/// Records are written once and never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Unique record identifier (UUID v4)
    pub id: String,

    /// Caller-supplied label of what was measured (e.g. "build")
    pub operation: String,

    /// When the measurement started
    pub timestamp: DateTime<Utc>,

    pub duration_seconds: f64,

    // CPU, in percent
    pub cpu_before: f64,
    pub cpu_during_avg: f64,
    pub cpu_peak: f64,

    // Memory, in MB
    pub ram_before_mb: u64,
    pub ram_during_avg_mb: u64,
    pub ram_peak_mb: u64,

    pub exit_code: i32,
    pub warnings_count: u32,
    pub errors_count: u32,
    pub output_size_kb: u64,

    /// Build environment version (best effort, "Unknown" when unavailable)
    pub environment_version: String,

    /// Compiler/toolchain version (best effort, "Unknown" when unavailable)
    pub toolchain_version: String,

    /// Optional scheme or target label
    pub scheme: Option<String>,
}

impl MetricsRecord {
    /// Whether the measured operation exited successfully.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Human readable duration: `"12.3s"` under a minute, `"2m 5s"` otherwise.
    pub fn formatted_duration(&self) -> String {
        if self.duration_seconds < 60.0 {
            format!("{:.1}s", self.duration_seconds)
        } else {
            let total = self.duration_seconds as u64;
            format!("{}m {}s", total / 60, total % 60)
        }
    }

    pub fn resources_summary(&self) -> String {
        format!(
            "CPU: {:.0}% avg, {:.0}% peak\nRAM: {} MB avg, {} MB peak",
            self.cpu_during_avg, self.cpu_peak, self.ram_during_avg_mb, self.ram_peak_mb
        )
    }
}

/// What the caller knows about a finished operation when stopping a measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: i32,
    pub warnings_count: u32,
    pub errors_count: u32,
    pub output_size_kb: u64,

    /// Overrides the scheme given when the measurement started
    pub scheme: Option<String>,
}

impl Outcome {
    pub fn exit_code(exit_code: i32) -> Self {
        Self { exit_code, ..Default::default() }
    }

    pub fn success() -> Self {
        Self::exit_code(0)
    }

    pub fn failure() -> Self {
        Self::exit_code(1)
    }

    pub fn with_diagnostics(mut self, warnings_count: u32, errors_count: u32) -> Self {
        self.warnings_count = warnings_count;
        self.errors_count = errors_count;
        self
    }

    pub fn with_output_size_kb(mut self, output_size_kb: u64) -> Self {
        self.output_size_kb = output_size_kb;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }
}

/// Aggregate over all records of one operation, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsStats {
    pub operation: String,
    pub execution_count: u64,
    pub avg_duration: f64,
    pub avg_cpu: f64,
    pub avg_ram_mb: f64,

    /// Fraction of executions that exited with code 0 (0.0-1.0)
    pub success_rate: f64,
}
