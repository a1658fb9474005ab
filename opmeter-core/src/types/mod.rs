//! Core domain types for opmeter.

pub mod record;
pub mod snapshot;

// Re-exports
pub use record::{MetricsRecord, MetricsStats, Outcome};
pub use snapshot::{ResourceStats, Snapshot};
