//! `opmeter list` command

use anyhow::Result;
use colored::Colorize;
use opmeter_core::types::MetricsRecord;
use opmeter_core::{Collector, Config};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "STARTED")]
    started: String,
    #[tabled(rename = "OPERATION")]
    operation: String,
    #[tabled(rename = "SCHEME")]
    scheme: String,
    #[tabled(rename = "DURATION")]
    duration: String,
    #[tabled(rename = "CPU AVG/PEAK")]
    cpu: String,
    #[tabled(rename = "RAM AVG/PEAK")]
    ram: String,
    #[tabled(rename = "EXIT")]
    exit: String,
    #[tabled(rename = "WARN")]
    warnings: u32,
    #[tabled(rename = "ERR")]
    errors: u32,
}

impl From<MetricsRecord> for RecordRow {
    fn from(record: MetricsRecord) -> Self {
        let exit = if record.is_success() {
            record.exit_code.to_string().green().to_string()
        } else {
            record.exit_code.to_string().red().to_string()
        };

        Self {
            started: record
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            duration: record.formatted_duration(),
            cpu: format!("{:.0}% / {:.0}%", record.cpu_during_avg, record.cpu_peak),
            ram: format!("{} / {} MB", record.ram_during_avg_mb, record.ram_peak_mb),
            operation: record.operation,
            scheme: record.scheme.unwrap_or_else(|| "-".to_string()),
            exit,
            warnings: record.warnings_count,
            errors: record.errors_count,
        }
    }
}

/// List recent records, optionally for one operation
pub async fn list(config: &Config, operation: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let collector = Collector::from_config(config).await?;

    let records = match operation {
        Some(operation) => collector.fetch(operation, limit).await?,
        None => collector.fetch_all().await?.into_iter().take(limit as usize).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No measurements recorded");
        return Ok(());
    }

    let rows: Vec<RecordRow> = records.into_iter().map(RecordRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{}", table);

    Ok(())
}
