//! Measurement lifecycle.
//!
//! A [`Collector`] brackets one operation at a time: [`Collector::start`] takes a
//! baseline snapshot and arms the resource sampler, [`Collector::stop`] disarms
//! it, stamps toolchain versions and writes one [`MetricsRecord`] through to the
//! store. Misuse (starting twice, stopping while idle) is logged and ignored.
//!
//! Independent measurement streams use independent collectors, which may share
//! one store.

use crate::config::Config;
use crate::error::Result;
use crate::monitor::{ResourceMonitor, Sampler};
use crate::observability::metrics as meter_metrics;
use crate::probe::{CommandProbe, VersionProbe};
use crate::store::{MetricsStore, RecordStore};
use crate::types::snapshot::normalize_cpu_percent;
use crate::types::{MetricsRecord, MetricsStats, Outcome, Snapshot};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

/// An in-flight measurement.
struct Measurement {
    operation: String,
    scheme: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    before: Snapshot,
    sampler: Sampler,
}

enum CollectorState {
    Idle,
    Measuring(Measurement),
}

/// Orchestrates monitor, version probe and store for one measurement at a time.
pub struct Collector {
    monitor: ResourceMonitor,
    store: Arc<dyn RecordStore>,
    probe: Arc<dyn VersionProbe>,
    state: Mutex<CollectorState>,
}

impl Collector {
    /// Create a collector from explicit dependencies.
    pub fn new(
        monitor: ResourceMonitor,
        store: Arc<dyn RecordStore>,
        probe: Arc<dyn VersionProbe>,
    ) -> Self {
        Self { monitor, store, probe, state: Mutex::new(CollectorState::Idle) }
    }

    /// Create a collector sampling the host, probing the configured commands
    /// and persisting to the configured database.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = MetricsStore::new(&config.db_path).await?;

        Ok(Self::new(
            ResourceMonitor::system(config.sample_interval()).await,
            Arc::new(store),
            Arc::new(CommandProbe::from_config(config)),
        ))
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Whether a measurement is in flight.
    pub async fn is_measuring(&self) -> bool {
        matches!(*self.state.lock().await, CollectorState::Measuring(_))
    }

    /// Label of the in-flight measurement, if any.
    pub async fn current_operation(&self) -> Option<String> {
        match &*self.state.lock().await {
            CollectorState::Measuring(m) => Some(m.operation.clone()),
            CollectorState::Idle => None,
        }
    }

    /// Begin measuring `operation`.
    ///
    /// Returns `false` without touching the in-flight measurement if one is
    /// already running.
    #[instrument(skip(self))]
    pub async fn start(&self, operation: &str, scheme: Option<&str>) -> bool {
        let mut state = self.state.lock().await;

        if let CollectorState::Measuring(current) = &*state {
            warn!(
                "Operation {} already in progress, ignoring start of {}",
                current.operation, operation
            );
            return false;
        }

        let before = self.monitor.current_snapshot();
        let sampler = self.monitor.start();

        *state = CollectorState::Measuring(Measurement {
            operation: operation.to_string(),
            scheme: scheme.map(str::to_string),
            started_at: Utc::now(),
            started: Instant::now(),
            before,
            sampler,
        });

        info!("Measurement started: {}", operation);
        true
    }

    /// Finish the in-flight measurement and persist its record.
    ///
    /// Returns `Ok(None)` when nothing was being measured. On a storage failure
    /// the record is lost, the error is returned, and the collector is idle.
    #[instrument(skip(self))]
    pub async fn stop(&self, outcome: Outcome) -> Result<Option<MetricsRecord>> {
        let Some(measurement) = self.take_measurement().await else {
            warn!("No operation in progress, ignoring stop");
            return Ok(None);
        };

        let duration_seconds = measurement.started.elapsed().as_secs_f64();
        let stats = measurement.sampler.stop().await;
        let versions = self.probe.probe().await;

        let record = MetricsRecord {
            id: uuid::Uuid::new_v4().to_string(),
            operation: measurement.operation,
            timestamp: measurement.started_at,
            duration_seconds,
            cpu_before: normalize_cpu_percent(measurement.before.cpu_percent),
            cpu_during_avg: stats.cpu_avg,
            cpu_peak: stats.cpu_peak,
            ram_before_mb: measurement.before.used_memory_mb,
            ram_during_avg_mb: stats.ram_avg_mb,
            ram_peak_mb: stats.ram_peak_mb,
            exit_code: outcome.exit_code,
            warnings_count: outcome.warnings_count,
            errors_count: outcome.errors_count,
            output_size_kb: outcome.output_size_kb,
            environment_version: versions.environment_version,
            toolchain_version: versions.toolchain_version,
            scheme: outcome.scheme.or(measurement.scheme),
        };

        meter_metrics::record_measurement(&record.operation, duration_seconds, record.is_success());

        match self.store.save(&record).await {
            Ok(()) => {
                info!(
                    samples = stats.samples,
                    "Measurement completed: {} - {}",
                    record.operation,
                    record.formatted_duration()
                );
                Ok(Some(record))
            }
            Err(e) => {
                meter_metrics::record_lost(&record.operation);
                error!(
                    operation = %record.operation,
                    error = %e,
                    "Failed to save metrics record, measurement lost"
                );
                Err(e)
            }
        }
    }

    /// Abandon the in-flight measurement without persisting anything.
    ///
    /// Returns `false` when nothing was being measured.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> bool {
        let Some(measurement) = self.take_measurement().await else {
            warn!("No operation in progress, ignoring cancel");
            return false;
        };

        // Wait for the sampler to exit so no tick outlives the cancel.
        let _ = measurement.sampler.stop().await;
        meter_metrics::record_cancelled();

        info!("Measurement cancelled: {}", measurement.operation);
        true
    }

    /// Measure `work`, recording exit code 0 on `Ok` and 1 on `Err` or panic.
    ///
    /// The work's result (or panic) is passed through unchanged. A failure to
    /// persist the record is logged, not returned. If another measurement is
    /// already in flight the work runs unmeasured and that measurement is left
    /// alone.
    pub async fn measure<F, Fut, T, E>(
        &self,
        operation: &str,
        scheme: Option<&str>,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if !self.start(operation, scheme).await {
            return work().await;
        }

        let result = AssertUnwindSafe(async { work().await }).catch_unwind().await;

        let outcome = match &result {
            Ok(Ok(_)) => Outcome::success(),
            Ok(Err(_)) | Err(_) => Outcome::failure(),
        };
        if let Err(e) = self.stop(outcome).await {
            warn!(error = %e, "Measurement of {} could not be recorded", operation);
        }

        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn take_measurement(&self) -> Option<Measurement> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, CollectorState::Idle) {
            CollectorState::Measuring(measurement) => Some(measurement),
            CollectorState::Idle => None,
        }
    }

    // ========================
    // Queries
    // ========================

    pub async fn fetch_all(&self) -> Result<Vec<MetricsRecord>> {
        self.store.fetch_all().await
    }

    pub async fn fetch(&self, operation: &str, limit: u32) -> Result<Vec<MetricsRecord>> {
        self.store.fetch(operation, limit).await
    }

    pub async fn fetch_last(&self) -> Result<Option<MetricsRecord>> {
        self.store.fetch_last().await
    }

    pub async fn stats(&self, operation: &str) -> Result<Option<MetricsStats>> {
        self.store.stats(operation).await
    }

    pub async fn cleanup(&self, older_than_days: u32) -> Result<u64> {
        self.store.cleanup(older_than_days).await
    }
}
