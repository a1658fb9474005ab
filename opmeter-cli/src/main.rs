use anyhow::Result;
use clap::{Parser, Subcommand};
use opmeter_core::Config;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "opmeter")]
#[command(about = "Measure duration and resource usage of build operations", long_about = None)]
struct Cli {
    /// Metrics database path (overrides the configured one)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current CPU and memory usage
    Current,

    /// Run a command and record its metrics
    Run {
        /// Operation label (e.g., "build", "test", "lint")
        operation: String,

        /// Scheme or target being built
        #[arg(short, long)]
        scheme: Option<String>,

        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Show aggregate statistics per operation
    Stats {
        /// Operation (all operations if omitted)
        operation: Option<String>,
    },

    /// List recent measurements, newest first
    List {
        /// Only show this operation
        #[arg(short, long)]
        operation: Option<String>,

        /// Maximum number of records
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Delete measurements older than the retention window
    Cleanup {
        /// Age in days (defaults to the configured retention)
        #[arg(short, long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = &cli.db {
        config.db_path = db.to_string_lossy().into_owned();
    }

    if let Err(e) = opmeter_core::init_observability(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Current => {
            commands::current(cli.json).await?;
        }

        Commands::Run { operation, scheme, command } => {
            let code =
                commands::run(&config, &operation, scheme.as_deref(), &command, cli.json).await?;
            std::process::exit(code);
        }

        Commands::Stats { operation } => {
            commands::stats(&config, operation.as_deref(), cli.json).await?;
        }

        Commands::List { operation, limit } => {
            commands::list(&config, operation.as_deref(), limit, cli.json).await?;
        }

        Commands::Cleanup { days } => {
            commands::cleanup(&config, days.unwrap_or(config.retention_days), cli.json).await?;
        }
    }

    Ok(())
}
