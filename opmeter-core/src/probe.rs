//! Best-effort toolchain version probes.
//!
//! Probes never fail: a missing binary, a non-zero exit, a timeout or
//! unparseable output all degrade to [`UNKNOWN_VERSION`].

use crate::config::{Config, ProbeCommand};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Sentinel stored when a version could not be determined.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Versions recorded alongside a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainInfo {
    pub environment_version: String,
    pub toolchain_version: String,
}

impl ToolchainInfo {
    pub fn unknown() -> Self {
        Self {
            environment_version: UNKNOWN_VERSION.to_string(),
            toolchain_version: UNKNOWN_VERSION.to_string(),
        }
    }
}

/// Source of the version strings stamped on each record.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn probe(&self) -> ToolchainInfo;
}

/// Runs external commands and parses their version line.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    environment: ProbeCommand,
    toolchain: ProbeCommand,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(environment: ProbeCommand, toolchain: ProbeCommand, timeout: Duration) -> Self {
        Self { environment, toolchain, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.environment_probe.clone(),
            config.toolchain_probe.clone(),
            config.probe_timeout(),
        )
    }

    async fn run(&self, command: &ProbeCommand) -> String {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(program = %command.program, error = %e, "Version probe failed to run");
                return UNKNOWN_VERSION.to_string();
            }
            Err(_) => {
                debug!(
                    program = %command.program,
                    timeout = ?self.timeout,
                    "Version probe timed out"
                );
                return UNKNOWN_VERSION.to_string();
            }
        };

        if !output.status.success() {
            debug!(
                program = %command.program,
                status = %output.status,
                "Version probe exited with failure"
            );
            return UNKNOWN_VERSION.to_string();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version_line(&stdout, command.line_prefix.as_deref())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }
}

#[async_trait]
impl VersionProbe for CommandProbe {
    async fn probe(&self) -> ToolchainInfo {
        let (environment_version, toolchain_version) =
            tokio::join!(self.run(&self.environment), self.run(&self.toolchain));
        ToolchainInfo { environment_version, toolchain_version }
    }
}

/// Fixed versions, for tests or when probing is disabled.
#[derive(Debug, Clone)]
pub struct StaticProbe(ToolchainInfo);

impl StaticProbe {
    pub fn new(
        environment_version: impl Into<String>,
        toolchain_version: impl Into<String>,
    ) -> Self {
        Self(ToolchainInfo {
            environment_version: environment_version.into(),
            toolchain_version: toolchain_version.into(),
        })
    }

    pub fn unknown() -> Self {
        Self(ToolchainInfo::unknown())
    }
}

#[async_trait]
impl VersionProbe for StaticProbe {
    async fn probe(&self) -> ToolchainInfo {
        self.0.clone()
    }
}

/// Pick the version line from command output.
///
/// With a prefix, the first line starting with it; otherwise the first line.
/// Blank results yield `None`.
pub fn parse_version_line(output: &str, prefix: Option<&str>) -> Option<String> {
    let line = match prefix {
        Some(prefix) => output.lines().map(str::trim).find(|l| l.starts_with(prefix))?,
        None => output.lines().next()?.trim(),
    };

    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_line() {
        let output = "swift-driver version: 1.115 Apple Swift version 6.0\nTarget: arm64\n";
        assert_eq!(
            parse_version_line(output, None).as_deref(),
            Some("swift-driver version: 1.115 Apple Swift version 6.0")
        );
    }

    #[test]
    fn test_parse_prefixed_line() {
        let output = "  Xcode 16.0  \nBuild version 16A242d\n";
        assert_eq!(parse_version_line(output, Some("Xcode")).as_deref(), Some("Xcode 16.0"));
        assert_eq!(parse_version_line(output, Some("Swift")), None);
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_version_line("", None), None);
        assert_eq!(parse_version_line("\n\n", None), None);
    }

    #[tokio::test]
    async fn test_missing_binary_degrades_to_unknown() {
        let probe = CommandProbe::new(
            ProbeCommand::new("opmeter-definitely-missing-binary", &["--version"]),
            ProbeCommand::new("opmeter-also-missing", &[]),
            Duration::from_secs(1),
        );

        assert_eq!(probe.probe().await, ToolchainInfo::unknown());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_probe_reads_output() {
        let probe = CommandProbe::new(
            ProbeCommand::new("echo", &["Tool 1.2.3"]),
            ProbeCommand::new("sh", &["-c", "echo noise; echo 'Compiler 9.9'"])
                .with_line_prefix("Compiler"),
            Duration::from_secs(5),
        );

        let info = probe.probe().await;
        assert_eq!(info.environment_version, "Tool 1.2.3");
        assert_eq!(info.toolchain_version, "Compiler 9.9");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_and_slow_commands_degrade() {
        let probe = CommandProbe::new(
            ProbeCommand::new("sh", &["-c", "echo 'Tool 1.0'; exit 3"]),
            ProbeCommand::new("sleep", &["5"]),
            Duration::from_millis(200),
        );

        assert_eq!(probe.probe().await, ToolchainInfo::unknown());
    }

    #[tokio::test]
    async fn test_static_probe() {
        let info = StaticProbe::new("Xcode 16.0", "Swift 6.0").probe().await;
        assert_eq!(info.environment_version, "Xcode 16.0");
        assert_eq!(info.toolchain_version, "Swift 6.0");
    }
}
