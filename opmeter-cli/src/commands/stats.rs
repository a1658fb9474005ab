//! `opmeter stats` command

use anyhow::Result;
use opmeter_core::types::MetricsStats;
use opmeter_core::{Collector, Config};
use std::collections::BTreeSet;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "OPERATION")]
    operation: String,
    #[tabled(rename = "RUNS")]
    runs: u64,
    #[tabled(rename = "AVG DURATION")]
    avg_duration: String,
    #[tabled(rename = "AVG CPU")]
    avg_cpu: String,
    #[tabled(rename = "AVG RAM")]
    avg_ram: String,
    #[tabled(rename = "SUCCESS")]
    success: String,
}

impl From<MetricsStats> for StatsRow {
    fn from(stats: MetricsStats) -> Self {
        Self {
            operation: stats.operation,
            runs: stats.execution_count,
            avg_duration: format!("{:.1}s", stats.avg_duration),
            avg_cpu: format!("{:.0}%", stats.avg_cpu),
            avg_ram: format!("{:.0} MB", stats.avg_ram_mb),
            success: format!("{:.0}%", stats.success_rate * 100.0),
        }
    }
}

/// Show aggregates for one operation, or for every recorded operation
pub async fn stats(config: &Config, operation: Option<&str>, json: bool) -> Result<()> {
    let collector = Collector::from_config(config).await?;

    let operations: Vec<String> = match operation {
        Some(operation) => vec![operation.to_string()],
        None => {
            let names: BTreeSet<String> =
                collector.fetch_all().await?.into_iter().map(|r| r.operation).collect();
            names.into_iter().collect()
        }
    };

    let mut all_stats = Vec::new();
    for operation in &operations {
        if let Some(stats) = collector.stats(operation).await? {
            all_stats.push(stats);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_stats)?);
        return Ok(());
    }

    if all_stats.is_empty() {
        match operation {
            Some(operation) => println!("No measurements for {}", operation),
            None => println!("No measurements recorded"),
        }
        return Ok(());
    }

    let rows: Vec<StatsRow> = all_stats.into_iter().map(StatsRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{}", table);

    Ok(())
}
