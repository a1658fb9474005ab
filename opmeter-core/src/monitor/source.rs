//! Snapshot sources.

use crate::types::snapshot::normalize_cpu_percent;
use crate::types::Snapshot;
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

const BYTES_PER_MB: u64 = 1_048_576;

/// Something that can report the current resource usage of the host.
pub trait SnapshotSource: Send + Sync {
    /// Take one reading. Must not block for longer than a system query.
    fn snapshot(&self) -> Snapshot;
}

struct HostState {
    system: System,
    cpu_refreshed_at: Instant,
}

/// Host-wide readings via `sysinfo`.
///
/// CPU usage is the global utilisation averaged over all cores, so it stays
/// within 0-100 regardless of core count. It is the load between the last two
/// CPU refreshes, which are never closer than `MINIMUM_CPU_UPDATE_INTERVAL`:
/// readings taken sooner reuse the previous CPU value.
pub struct SysinfoSource {
    state: Mutex<HostState>,
}

impl SysinfoSource {
    /// Create a source whose first reading already reflects current load.
    ///
    /// Waits `MINIMUM_CPU_UPDATE_INTERVAL` between two CPU refreshes, since a
    /// single refresh only yields the average since boot.
    pub async fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu();
        system.refresh_memory();

        Self { state: Mutex::new(HostState { system, cpu_refreshed_at: Instant::now() }) }
    }
}

impl SnapshotSource for SysinfoSource {
    fn snapshot(&self) -> Snapshot {
        // A poisoned lock only means a previous refresh panicked; the System is still usable.
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.cpu_refreshed_at.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL {
            state.system.refresh_cpu();
            state.cpu_refreshed_at = Instant::now();
        }
        state.system.refresh_memory();

        Snapshot::new(
            normalize_cpu_percent(f64::from(state.system.global_cpu_info().cpu_usage())),
            state.system.used_memory() / BYTES_PER_MB,
            state.system.free_memory() / BYTES_PER_MB,
        )
    }
}
