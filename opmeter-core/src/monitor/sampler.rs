//! Periodic sampling and aggregation.

use super::source::{SnapshotSource, SysinfoSource};
use crate::types::snapshot::normalize_cpu_percent;
use crate::types::{ResourceStats, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Running sum/count/peak of the readings taken by one armed sampler.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Accumulator {
    cpu_sum: f64,
    cpu_peak: f64,
    ram_sum: u64,
    ram_peak: u64,
    count: u64,
}

impl Accumulator {
    pub(crate) fn fold(&mut self, snapshot: &Snapshot) {
        let cpu = normalize_cpu_percent(snapshot.cpu_percent);

        self.cpu_sum += cpu;
        self.cpu_peak = self.cpu_peak.max(cpu);
        self.ram_sum += snapshot.used_memory_mb;
        self.ram_peak = self.ram_peak.max(snapshot.used_memory_mb);
        self.count += 1;
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Finalize into stats, or `None` when nothing was folded in.
    pub(crate) fn finish(&self) -> Option<ResourceStats> {
        (self.count > 0).then(|| self.stats())
    }

    /// Finalize, taking one reading from `fallback` if no sample was collected.
    pub(crate) fn finish_or_sample(mut self, fallback: &dyn SnapshotSource) -> ResourceStats {
        if let Some(stats) = self.finish() {
            return stats;
        }

        debug!("No periodic samples collected, taking a fallback sample");
        self.fold(&fallback.snapshot());
        self.stats()
    }

    fn stats(&self) -> ResourceStats {
        let count = self.count.max(1);

        // Rounding in the sum can push the mean a hair above the peak.
        let cpu_avg = (self.cpu_sum / count as f64).min(self.cpu_peak);
        let ram_avg_mb = (self.ram_sum / count).min(self.ram_peak);

        ResourceStats {
            cpu_avg,
            cpu_peak: self.cpu_peak,
            ram_avg_mb,
            ram_peak_mb: self.ram_peak,
            samples: self.count,
        }
    }
}

/// Takes snapshots and arms periodic samplers over a shared source.
#[derive(Clone)]
pub struct ResourceMonitor {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
}

impl ResourceMonitor {
    /// Create a monitor over an arbitrary snapshot source.
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Create a monitor reading the host through `sysinfo`.
    ///
    /// Waits for the source's first CPU window so the baseline is a current reading.
    pub async fn system(interval: Duration) -> Self {
        Self::new(Arc::new(SysinfoSource::new().await), interval)
    }

    /// Time between two samples while armed.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take one reading now. Does not touch any armed sampler.
    pub fn current_snapshot(&self) -> Snapshot {
        self.source.snapshot()
    }

    /// Arm a periodic sampler with fresh accumulators.
    ///
    /// The first sample is taken immediately, then one per interval until
    /// [`Sampler::stop`]. Must be called within a Tokio runtime.
    pub fn start(&self) -> Sampler {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(sample_loop(self.source.clone(), self.interval, stop_rx));
        debug!(interval_ms = self.interval.as_millis() as u64, "Resource sampling started");

        Sampler { stop_tx, handle, source: self.source.clone() }
    }
}

async fn sample_loop(
    source: Arc<dyn SnapshotSource>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> Accumulator {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut acc = Accumulator::default();
    loop {
        tokio::select! {
            biased;
            // A dropped sender disarms the sampler just like an explicit stop.
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let snapshot = source.snapshot();
                acc.fold(&snapshot);
                trace!(
                    cpu = snapshot.cpu_percent,
                    ram_mb = snapshot.used_memory_mb,
                    samples = acc.count(),
                    "Resource sample"
                );
            }
        }
    }
    acc
}

/// An armed periodic sampler. Dropping it disarms the task and discards the data.
pub struct Sampler {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<Accumulator>,
    source: Arc<dyn SnapshotSource>,
}

impl Sampler {
    /// Disarm the sampler and return the aggregated stats.
    ///
    /// A tick in progress completes and is included; once this returns the
    /// task has exited and no further reading can be folded in.
    pub async fn stop(self) -> ResourceStats {
        // The receiver is gone only if the task already ended.
        let _ = self.stop_tx.send(());

        let acc = match self.handle.await {
            Ok(acc) => acc,
            Err(e) => {
                warn!(error = %e, "Resource sampler task failed, samples lost");
                Accumulator::default()
            }
        };

        debug!(samples = acc.count(), "Resource sampling stopped");
        acc.finish_or_sample(self.source.as_ref())
    }
}
