//! Resource readings and their aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time resource reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the reading was taken
    pub taken_at: DateTime<Utc>,

    /// Whole-system CPU utilisation averaged over all cores (0-100)
    pub cpu_percent: f64,

    /// Memory in use, in MB
    pub used_memory_mb: u64,

    /// Memory not in use, in MB
    pub free_memory_mb: u64,
}

impl Snapshot {
    pub fn new(cpu_percent: f64, used_memory_mb: u64, free_memory_mb: u64) -> Self {
        Self { taken_at: Utc::now(), cpu_percent, used_memory_mb, free_memory_mb }
    }
}

/// Map a raw CPU reading into 0-100, treating NaN and infinities as idle.
pub(crate) fn normalize_cpu_percent(cpu: f64) -> f64 {
    if cpu.is_finite() {
        cpu.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Peak/average usage over the readings taken while a sampler was armed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub cpu_avg: f64,
    pub cpu_peak: f64,
    pub ram_avg_mb: u64,
    pub ram_peak_mb: u64,

    /// Number of readings folded in (at least 1)
    pub samples: u64,
}
