//! Centralized path configuration for opmeter.
//!
//! All data paths should go through this module so the CLI and any embedding
//! process agree on where the metrics database lives.

use std::path::PathBuf;

/// Get the opmeter data directory.
///
/// Resolution order:
/// 1. `OPMETER_DATA_DIR` environment variable
/// 2. `~/.opmeter`
/// 3. `./.opmeter` when no home directory can be determined
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("OPMETER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".opmeter")).unwrap_or_else(|| PathBuf::from(".opmeter"))
}

/// Get the metrics database path.
pub fn db_path() -> PathBuf {
    data_dir().join("metrics.db")
}

/// Get the configuration directory.
///
/// `OPMETER_CONFIG_DIR` wins, then the platform config dir, then the data dir.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("OPMETER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir().map(|c| c.join("opmeter")).unwrap_or_else(data_dir)
}
