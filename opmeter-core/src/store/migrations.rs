//! Database migrations.

use crate::error::{MeterError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

pub(crate) const SCHEMA_VERSION: i64 = 2;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    // Create schema_version table if not exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version(pool).await?;

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    Ok(())
}

/// Schema version recorded in the database, 0 for a fresh one.
pub(crate) async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    Ok(version.unwrap_or(0))
}

async fn set_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    // Timestamps are milliseconds since the Unix epoch (UTC)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id TEXT PRIMARY KEY,
            operation TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            duration_seconds REAL NOT NULL,
            cpu_before REAL NOT NULL,
            cpu_during_avg REAL NOT NULL,
            cpu_peak REAL NOT NULL,
            ram_before_mb INTEGER NOT NULL,
            ram_during_avg_mb INTEGER NOT NULL,
            ram_peak_mb INTEGER NOT NULL,
            exit_code INTEGER NOT NULL,
            warnings_count INTEGER NOT NULL DEFAULT 0,
            errors_count INTEGER NOT NULL DEFAULT 0,
            output_size_kb INTEGER NOT NULL DEFAULT 0,
            environment_version TEXT NOT NULL DEFAULT 'Unknown',
            toolchain_version TEXT NOT NULL DEFAULT 'Unknown',
            scheme_name TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_operation ON metrics(operation)")
        .execute(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 1).await?;

    info!("Migration to schema version 1 complete");
    Ok(())
}

/// Migration to schema version 2: composite index for per-operation history queries.
#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 2");

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metrics_operation_timestamp \
         ON metrics(operation, timestamp)",
    )
    .execute(pool)
    .await
    .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    // Covered by the composite index
    sqlx::query("DROP INDEX IF EXISTS idx_metrics_operation")
        .execute(pool)
        .await
        .map_err(|e| MeterError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 2).await?;

    info!("Migration to schema version 2 complete");
    Ok(())
}
