//! `opmeter run` command

use anyhow::{Context, Result};
use colored::Colorize;
use opmeter_core::types::{MetricsRecord, Outcome};
use opmeter_core::{Collector, Config};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::warn;

/// Run `command` under measurement and return its exit code.
///
/// Child output is echoed as it arrives (to stderr in JSON mode) and scanned
/// for the configured warning and error markers once the child exits.
pub async fn run(
    config: &Config,
    operation: &str,
    scheme: Option<&str>,
    command: &[String],
    json: bool,
) -> Result<i32> {
    let (program, args) = command.split_first().context("No command given")?;
    let collector = Collector::from_config(config).await?;

    collector.start(operation, scheme).await;

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            collector.cancel().await;
            return Err(e).with_context(|| format!("Failed to start {}", program));
        }
    };

    let stdout = child.stdout.take().context("Child stdout not captured")?;
    let stderr = child.stderr.take().context("Child stderr not captured")?;

    let captured = if json {
        tokio::try_join!(
            tee(stdout, tokio::io::stderr()),
            tee(stderr, tokio::io::stderr()),
            child.wait()
        )
    } else {
        tokio::try_join!(
            tee(stdout, tokio::io::stdout()),
            tee(stderr, tokio::io::stderr()),
            child.wait()
        )
    };

    let (out, err, status) = match captured {
        Ok(captured) => captured,
        Err(e) => {
            // Kill and reap the child before giving up on it
            let _ = child.kill().await;
            collector.cancel().await;
            return Err(e).with_context(|| format!("Failed to capture output of {}", program));
        }
    };

    // Signal deaths have no code
    let exit_code = status.code().unwrap_or(1);

    let mut output = String::from_utf8_lossy(&out).into_owned();
    output.push_str(&String::from_utf8_lossy(&err));
    let outcome = Outcome::exit_code(exit_code)
        .with_diagnostics(
            count_markers(&output, &config.warning_marker),
            count_markers(&output, &config.error_marker),
        )
        .with_output_size_kb(((out.len() + err.len()) / 1024) as u64);

    match collector.stop(outcome).await {
        Ok(Some(record)) => print_record(&record, json)?,
        Ok(None) => {}
        Err(e) => eprintln!("{} Metrics not saved: {}", "✗".red().bold(), e),
    }

    Ok(exit_code)
}

/// Copy `reader` to `writer` chunk by chunk, keeping everything read.
///
/// A failing writer (e.g. a closed pipe) stops the echo but not the capture,
/// so the child is never blocked on a full pipe and its output is still counted.
async fn tee<R, W>(mut reader: R, mut writer: W) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    let mut echo = true;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if echo {
            if let Err(e) = echo_chunk(&mut writer, &buf[..n]).await {
                warn!(error = %e, "Stopped echoing command output");
                echo = false;
            }
        }
        captured.extend_from_slice(&buf[..n]);
    }

    Ok(captured)
}

async fn echo_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

/// Case-sensitive count of `marker` in `output`. An empty marker matches nothing.
fn count_markers(output: &str, marker: &str) -> u32 {
    if marker.is_empty() {
        return 0;
    }
    output.matches(marker).count().try_into().unwrap_or(u32::MAX)
}

fn print_record(record: &MetricsRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let status = if record.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };

    eprintln!();
    eprintln!(
        "{} {} finished in {} (exit {})",
        status,
        record.operation.bold(),
        record.formatted_duration(),
        record.exit_code
    );
    for line in record.resources_summary().lines() {
        eprintln!("  {}", line);
    }
    eprintln!(
        "  Warnings: {}, errors: {}, output: {} KB",
        record.warnings_count, record.errors_count, record.output_size_kb
    );
    eprintln!(
        "  {}",
        format!("{} / {}", record.environment_version, record.toolchain_version).dimmed()
    );

    Ok(())
}
