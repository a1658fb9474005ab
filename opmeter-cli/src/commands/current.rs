//! `opmeter current` command

use anyhow::Result;
use colored::Colorize;
use opmeter_core::{SnapshotSource, SysinfoSource};

/// Print one resource snapshot of the host
pub async fn current(json: bool) -> Result<()> {
    let snapshot = SysinfoSource::new().await.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", "Current resources".bold());
    println!("  CPU:  {:.1}%", snapshot.cpu_percent);
    println!(
        "  RAM:  {} MB used, {} MB free",
        snapshot.used_memory_mb,
        snapshot.free_memory_mb.to_string().dimmed()
    );

    Ok(())
}
