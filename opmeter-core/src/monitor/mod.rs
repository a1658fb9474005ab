//! Resource monitoring for measured operations.
//!
//! Takes instantaneous snapshots and, while armed, samples them periodically
//! on a background task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   start()    ┌──────────────────────────┐
//! │ ResourceMonitor │ ───────────► │ Sampler (tokio task)     │
//! │  └─ source      │              │  ├─ interval tick        │
//! │                 │              │  ├─ source.snapshot()    │
//! │                 │              │  └─ Accumulator          │
//! └─────────────────┘              └──────────────────────────┘
//!                                        │ stop(): oneshot signal,
//!                                        ▼ accumulator via JoinHandle
//!                                   ResourceStats
//! ```

mod sampler;
mod source;

pub use sampler::{ResourceMonitor, Sampler};
pub use source::{SnapshotSource, SysinfoSource};

use std::time::Duration;

/// Default time between two samples of an armed monitor.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
