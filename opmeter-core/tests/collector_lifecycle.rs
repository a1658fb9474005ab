//! Integration tests for the measurement lifecycle.
//!
//! These tests drive a [`Collector`] end to end:
//! - Start, sample, stop, persist
//! - Misuse (double start, stop or cancel while idle)
//! - Scoped measurement of fallible work
//! - Storage failures
//!
//! Most tests use a scripted snapshot source, an in-memory record store and
//! paused Tokio time so sampling is deterministic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use opmeter_core::{
    error::{MeterError, Result},
    probe::UNKNOWN_VERSION,
    types::{MetricsRecord, MetricsStats, Outcome, Snapshot},
    Collector, MetricsStore, RecordStore, ResourceMonitor, SnapshotSource, StaticProbe,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed list of (cpu, ram) readings, repeating the last one.
struct Scripted {
    readings: Mutex<Vec<(f64, u64)>>,
    last: Mutex<(f64, u64)>,
}

impl Scripted {
    fn new(readings: &[(f64, u64)]) -> Arc<Self> {
        let mut readings = readings.to_vec();
        readings.reverse();
        Arc::new(Self { readings: Mutex::new(readings), last: Mutex::new((0.0, 0)) })
    }
}

impl SnapshotSource for Scripted {
    fn snapshot(&self) -> Snapshot {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.readings.lock().unwrap().pop() {
            *last = next;
        }
        Snapshot::new(last.0, last.1, 4096)
    }
}

/// Record store kept in a Vec, optionally failing every write.
#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<MetricsRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    fn failing() -> Self {
        Self { failing: AtomicBool::new(true), ..Default::default() }
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: &MetricsRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MeterError::storage("save", "disk I/O error"));
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.id != record.id);
        records.push(record.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<MetricsRecord>> {
        let mut records = self.records.lock().unwrap().clone();
        records.reverse();
        Ok(records)
    }

    async fn fetch(&self, operation: &str, limit: u32) -> Result<Vec<MetricsRecord>> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|r| r.operation == operation)
            .take(limit as usize)
            .collect())
    }

    async fn fetch_last(&self) -> Result<Option<MetricsRecord>> {
        Ok(self.records.lock().unwrap().last().cloned())
    }

    async fn stats(&self, _operation: &str) -> Result<Option<MetricsStats>> {
        Ok(None)
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

fn collector(readings: &[(f64, u64)], store: Arc<MemoryStore>) -> Collector {
    Collector::new(
        ResourceMonitor::new(Scripted::new(readings), Duration::from_secs(1)),
        store,
        Arc::new(StaticProbe::new("Xcode 16.0", "Swift version 6.0")),
    )
}

#[tokio::test(start_paused = true)]
async fn test_build_measurement_scenario() {
    let store = Arc::new(MemoryStore::default());
    // Baseline, then one reading per tick at 0s, 1s and 2s
    let collector =
        collector(&[(5.0, 100), (10.0, 100), (20.0, 150), (30.0, 200)], store.clone());

    assert!(collector.start("build", Some("Chat")).await);
    assert!(collector.is_measuring().await);
    assert_eq!(collector.current_operation().await.as_deref(), Some("build"));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let record = collector
        .stop(Outcome::success().with_diagnostics(3, 0).with_output_size_kb(12))
        .await
        .unwrap()
        .unwrap();

    assert!(!collector.is_measuring().await);
    assert_eq!(record.operation, "build");
    assert_eq!(record.scheme.as_deref(), Some("Chat"));
    assert!(record.duration_seconds >= 2.5);
    assert_eq!(record.cpu_before, 5.0);
    assert_eq!(record.ram_before_mb, 100);
    assert_eq!(record.cpu_during_avg, 20.0);
    assert_eq!(record.cpu_peak, 30.0);
    assert_eq!(record.ram_during_avg_mb, 150);
    assert_eq!(record.ram_peak_mb, 200);
    assert_eq!(record.exit_code, 0);
    assert!(record.is_success());
    assert_eq!(record.warnings_count, 3);
    assert_eq!(record.output_size_kb, 12);
    assert_eq!(record.environment_version, "Xcode 16.0");
    assert_eq!(record.toolchain_version, "Swift version 6.0");

    assert_eq!(store.len(), 1);
    assert_eq!(collector.fetch_last().await.unwrap(), Some(record));
}

#[tokio::test(start_paused = true)]
async fn test_outcome_scheme_overrides_start_scheme() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    collector.start("test", Some("Chat")).await;
    let record = collector
        .stop(Outcome::exit_code(65).with_scheme("ChatTests"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.scheme.as_deref(), Some("ChatTests"));
    assert_eq!(record.exit_code, 65);
    assert!(!record.is_success());
}

#[tokio::test]
async fn test_stop_while_idle_is_ignored() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    assert!(collector.stop(Outcome::success()).await.unwrap().is_none());
    assert!(!collector.cancel().await);
    assert_eq!(store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_keeps_first_measurement() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    assert!(collector.start("build", None).await);
    assert!(!collector.start("test", None).await);
    assert_eq!(collector.current_operation().await.as_deref(), Some("build"));

    let record = collector.stop(Outcome::success()).await.unwrap().unwrap();
    assert_eq!(record.operation, "build");
    assert!(collector.stop(Outcome::success()).await.unwrap().is_none());
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_persists_nothing() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(50.0, 500)], store.clone());

    collector.start("archive", None).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(collector.cancel().await);
    assert!(!collector.is_measuring().await);
    assert_eq!(store.len(), 0);

    // The collector is reusable afterwards
    assert!(collector.start("archive", None).await);
    assert!(collector.stop(Outcome::success()).await.unwrap().is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_measure_records_failure_and_propagates_error() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    let result: std::result::Result<(), String> = collector
        .measure("lint", None, || async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Err("3 violations".to_string())
        })
        .await;

    assert_eq!(result, Err("3 violations".to_string()));
    let record = collector.fetch_last().await.unwrap().unwrap();
    assert_eq!(record.operation, "lint");
    assert_eq!(record.exit_code, 1);
    assert!(record.duration_seconds >= 0.3);
    assert!(!collector.is_measuring().await);
}

#[tokio::test(start_paused = true)]
async fn test_measure_records_success() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    let value = collector
        .measure("test", Some("Chat"), || async { Ok::<_, String>(42) })
        .await
        .unwrap();

    assert_eq!(value, 42);
    let record = collector.fetch_last().await.unwrap().unwrap();
    assert_eq!(record.exit_code, 0);
    assert_eq!(record.scheme.as_deref(), Some("Chat"));
}

#[tokio::test(start_paused = true)]
async fn test_measure_records_panic_and_resumes_it() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    let crash = true;
    let work = move || async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if crash {
            panic!("archive step crashed");
        }
        Ok::<(), String>(())
    };
    let result = AssertUnwindSafe(collector.measure("archive", None, work)).catch_unwind().await;

    let panic = result.unwrap_err();
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"archive step crashed"));

    let records = collector.fetch_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(records[0].operation, "archive");
    assert_eq!(records[0].exit_code, 1);
    assert!(!collector.is_measuring().await);
}

#[tokio::test(start_paused = true)]
async fn test_measure_while_busy_runs_unmeasured() {
    let store = Arc::new(MemoryStore::default());
    let collector = collector(&[(1.0, 10)], store.clone());

    collector.start("build", None).await;
    let value = collector.measure("lint", None, || async { Ok::<_, String>("done") }).await;

    assert_eq!(value, Ok("done"));
    assert_eq!(store.len(), 0);
    assert_eq!(collector.current_operation().await.as_deref(), Some("build"));
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_is_reported_and_collector_goes_idle() {
    let store = Arc::new(MemoryStore::failing());
    let collector = collector(&[(1.0, 10)], store.clone());

    collector.start("build", None).await;
    let err = collector.stop(Outcome::success()).await.unwrap_err();

    assert!(err.is_storage());
    assert!(!collector.is_measuring().await);
    assert_eq!(store.len(), 0);

    // Scoped measurements swallow the save failure and keep the work's result
    let value = collector.measure("lint", None, || async { Ok::<_, String>(7) }).await;
    assert_eq!(value, Ok(7));
}

#[tokio::test]
async fn test_concurrent_starts_admit_exactly_one() {
    let store = Arc::new(MemoryStore::default());
    let collector = Arc::new(Collector::new(
        ResourceMonitor::new(Scripted::new(&[(1.0, 10)]), Duration::from_secs(3600)),
        store.clone(),
        Arc::new(StaticProbe::unknown()),
    ));

    let mut handles = Vec::new();
    for i in 0..16 {
        let collector = collector.clone();
        handles.push(tokio::spawn(async move {
            collector.start(&format!("op-{}", i), None).await
        }));
    }

    let mut started = 0;
    for handle in handles {
        if handle.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    let record = collector.stop(Outcome::success()).await.unwrap().unwrap();
    assert_eq!(record.environment_version, UNKNOWN_VERSION);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_invalid_baseline_cpu_is_stored_as_idle() {
    let store = Arc::new(MetricsStore::new_in_memory().await.unwrap());
    let collector = Collector::new(
        ResourceMonitor::new(
            Scripted::new(&[(f64::NAN, 10), (20.0, 30)]),
            Duration::from_secs(3600),
        ),
        store.clone(),
        Arc::new(StaticProbe::unknown()),
    );

    collector.start("build", None).await;
    let record = collector.stop(Outcome::success()).await.unwrap().unwrap();
    assert_eq!(record.cpu_before, 0.0);
    assert_eq!(record.ram_before_mb, 10);

    let stored = store.fetch_last().await.unwrap().unwrap();
    assert_eq!(stored.cpu_before, 0.0);
    assert_eq!(stored.id, record.id);
}

#[tokio::test]
async fn test_sqlite_round_trip_with_host_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MetricsStore::new(dir.path().join("metrics.db")).await.unwrap());
    let collector = Collector::new(
        ResourceMonitor::system(Duration::from_millis(50)).await,
        store.clone(),
        Arc::new(StaticProbe::unknown()),
    );

    for i in 0..5 {
        assert!(collector.start("build", None).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let outcome = if i % 2 == 0 { Outcome::success() } else { Outcome::failure() };
        let record = collector.stop(outcome).await.unwrap().unwrap();

        assert!(record.duration_seconds >= 0.0);
        assert!(record.cpu_peak >= record.cpu_during_avg);
        assert!(record.ram_peak_mb >= record.ram_during_avg_mb);
        assert!((0.0..=100.0).contains(&record.cpu_peak));
        // Keep timestamps strictly increasing at millisecond resolution
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let recent = collector.fetch("build", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].timestamp >= recent[1].timestamp);

    let all = collector.fetch_all().await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(recent[0].id, all[0].id);

    let stats = collector.stats("build").await.unwrap().unwrap();
    assert_eq!(stats.execution_count, 5);
    assert!((stats.success_rate - 0.6).abs() < 1e-9);

    assert_eq!(collector.cleanup(30).await.unwrap(), 0);
    assert!(collector.stats("deploy").await.unwrap().is_none());
}
