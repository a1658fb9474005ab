//! Configuration management.

use crate::error::{MeterError, Result};
use crate::monitor::DEFAULT_SAMPLE_INTERVAL;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An external command whose output reports a tool version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Pick the first output line starting with this prefix instead of the first line.
    #[serde(default)]
    pub line_prefix: Option<String>,
}

impl ProbeCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            line_prefix: None,
        }
    }

    pub fn with_line_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.line_prefix = Some(prefix.into());
        self
    }
}

/// Persistent configuration for opmeter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_interval_ms: u64,
    pub retention_days: u32,
    pub db_path: String,
    pub log_level: String,
    pub probe_timeout_secs: u64,
    pub environment_probe: ProbeCommand,
    pub toolchain_probe: ProbeCommand,
    pub warning_marker: String,
    pub error_marker: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL.as_millis() as u64,
            retention_days: 30,
            db_path: paths::db_path().to_string_lossy().to_string(),
            log_level: "info".to_string(),
            probe_timeout_secs: 5,
            environment_probe: ProbeCommand::new("xcodebuild", &["-version"])
                .with_line_prefix("Xcode"),
            toolchain_probe: ProbeCommand::new("swift", &["--version"]),
            warning_marker: "warning:".to_string(),
            error_marker: "error:".to_string(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.json")
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| MeterError::IoError { path: path.to_path_buf(), source: e })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| MeterError::InvalidConfig {
            reason: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MeterError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| MeterError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| MeterError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Reject values the sampler and probes cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(MeterError::InvalidConfig {
                reason: "sample_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.probe_timeout_secs == 0 {
            return Err(MeterError::InvalidConfig {
                reason: "probe_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.db_path.trim().is_empty() {
            return Err(MeterError::InvalidConfig { reason: "db_path is empty".to_string() });
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
