//! opmeter core library
//!
//! Measures named operations (builds, test runs, lints): wall-clock duration,
//! CPU and memory before and during the run, outcome and toolchain versions.
//! Each finished measurement becomes one immutable [`MetricsRecord`] in a local
//! SQLite store that can be queried and aggregated per operation.

pub mod collector;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod paths;
pub mod probe;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use collector::Collector;
pub use config::{Config, ProbeCommand};
pub use error::{MeterError, Result};
pub use monitor::{ResourceMonitor, Sampler, SnapshotSource, SysinfoSource};
pub use observability::init as init_observability;
pub use probe::{CommandProbe, StaticProbe, ToolchainInfo, VersionProbe};
pub use store::{MetricsStore, RecordStore};
pub use types::{MetricsRecord, MetricsStats, Outcome, ResourceStats, Snapshot};
