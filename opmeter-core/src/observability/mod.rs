//! Observability infrastructure: tracing and metrics.
//!
//! Library code only emits `tracing` events and `metrics` updates. Installing a
//! subscriber (and, if wanted, a metrics recorder) is left to the binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize global tracing and describe the core metrics.
///
/// `RUST_LOG` takes precedence over `default_level`. Log lines go to stderr so
/// command output on stdout stays machine readable.
///
/// Fails if a global subscriber is already installed or the filter is invalid.
pub fn init(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()?;

    metrics::register_core_metrics();
    tracing::debug!("Observability initialized (level: {})", default_level);

    Ok(())
}
