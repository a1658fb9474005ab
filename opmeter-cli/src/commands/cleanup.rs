//! `opmeter cleanup` command

use anyhow::Result;
use colored::Colorize;
use opmeter_core::{Collector, Config};

/// Delete records older than `days` days
pub async fn cleanup(config: &Config, days: u32, json: bool) -> Result<()> {
    let collector = Collector::from_config(config).await?;
    let removed = collector.cleanup(days).await?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed, "older_than_days": days }));
    } else {
        println!(
            "{} Removed {} record(s) older than {} days",
            "✓".green().bold(),
            removed,
            days
        );
    }

    Ok(())
}
