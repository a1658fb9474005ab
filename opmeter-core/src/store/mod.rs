//! Record persistence with SQLite.
//!
//! The [`RecordStore`] trait is the collector's view of storage; [`MetricsStore`]
//! implements it on a single `metrics` table indexed by `(operation, timestamp)`.
//! Every record is written with one statement, so readers never observe a
//! partially written row and SQLite serializes concurrent writers.

use crate::error::{MeterError, Result};
use crate::observability::metrics as meter_metrics;
use crate::types::{MetricsRecord, MetricsStats};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

pub mod migrations;


const RECORD_COLUMNS: &str = "id, operation, timestamp, duration_seconds, cpu_before, \
     cpu_during_avg, cpu_peak, ram_before_mb, ram_during_avg_mb, ram_peak_mb, exit_code, \
     warnings_count, errors_count, output_size_kb, environment_version, toolchain_version, \
     scheme_name";

/// Durable, queryable storage for measurement records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, replacing any existing record with the same id.
    async fn save(&self, record: &MetricsRecord) -> Result<()>;

    /// All records, newest first.
    async fn fetch_all(&self) -> Result<Vec<MetricsRecord>>;

    /// Up to `limit` records of one operation, newest first.
    async fn fetch(&self, operation: &str, limit: u32) -> Result<Vec<MetricsRecord>>;

    /// The most recent record of any operation.
    async fn fetch_last(&self) -> Result<Option<MetricsRecord>>;

    /// Aggregate over all records of one operation, `None` if there are none.
    async fn stats(&self, operation: &str) -> Result<Option<MetricsStats>>;

    /// Delete every record that started strictly before `cutoff`.
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete every record older than `older_than_days` days.
    ///
    /// A window reaching past the earliest representable date deletes nothing.
    async fn cleanup(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = Duration::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age));

        match cutoff {
            Some(cutoff) => self.cleanup_before(cutoff).await,
            None => Ok(0),
        }
    }
}

/// SQLite-backed record store.
#[derive(Clone)]
pub struct MetricsStore {
    pool: SqlitePool,
}

impl MetricsStore {
    /// Create a store backed by a private in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(|e| MeterError::storage("open", e))?;

        // Each in-memory connection would otherwise see its own database.
        Self::connect(options, 1).await
    }

    /// Open (creating if needed) the database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening metrics store at {:?}", db_path);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MeterError::IoError { path: parent.to_path_buf(), source: e })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        Self::connect(options, 5).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let options = options.log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MeterError::storage("open", e))?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("Metrics store initialized successfully");
        Ok(store)
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_record(row: &SqliteRow) -> Result<MetricsRecord> {
        let get_err = |e: sqlx::Error| MeterError::storage("decode", e);

        let timestamp_ms: i64 = row.try_get("timestamp").map_err(get_err)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            MeterError::storage("decode", format!("timestamp out of range: {}", timestamp_ms))
        })?;

        let scheme: String = row.try_get("scheme_name").map_err(get_err)?;

        Ok(MetricsRecord {
            id: row.try_get("id").map_err(get_err)?,
            operation: row.try_get("operation").map_err(get_err)?,
            timestamp,
            duration_seconds: row.try_get("duration_seconds").map_err(get_err)?,
            cpu_before: row.try_get("cpu_before").map_err(get_err)?,
            cpu_during_avg: row.try_get("cpu_during_avg").map_err(get_err)?,
            cpu_peak: row.try_get("cpu_peak").map_err(get_err)?,
            ram_before_mb: row.try_get::<i64, _>("ram_before_mb").map_err(get_err)? as u64,
            ram_during_avg_mb: row.try_get::<i64, _>("ram_during_avg_mb").map_err(get_err)?
                as u64,
            ram_peak_mb: row.try_get::<i64, _>("ram_peak_mb").map_err(get_err)? as u64,
            exit_code: row.try_get::<i64, _>("exit_code").map_err(get_err)? as i32,
            warnings_count: row.try_get::<i64, _>("warnings_count").map_err(get_err)? as u32,
            errors_count: row.try_get::<i64, _>("errors_count").map_err(get_err)? as u32,
            output_size_kb: row.try_get::<i64, _>("output_size_kb").map_err(get_err)? as u64,
            environment_version: row.try_get("environment_version").map_err(get_err)?,
            toolchain_version: row.try_get("toolchain_version").map_err(get_err)?,
            scheme: (!scheme.is_empty()).then_some(scheme),
        })
    }

    fn rows_to_records(rows: Vec<SqliteRow>) -> Result<Vec<MetricsRecord>> {
        rows.iter().map(Self::row_to_record).collect()
    }
}

/// Map a sqlx error to a storage error, counting it per operation.
fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> MeterError {
    move |e| {
        meter_metrics::record_db_error(operation);
        MeterError::storage(operation, e)
    }
}

#[async_trait]
impl RecordStore for MetricsStore {
    #[instrument(skip(self, record), fields(record_id = %record.id, operation = %record.operation))]
    async fn save(&self, record: &MetricsRecord) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO metrics ({RECORD_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                operation = excluded.operation,
                timestamp = excluded.timestamp,
                duration_seconds = excluded.duration_seconds,
                cpu_before = excluded.cpu_before,
                cpu_during_avg = excluded.cpu_during_avg,
                cpu_peak = excluded.cpu_peak,
                ram_before_mb = excluded.ram_before_mb,
                ram_during_avg_mb = excluded.ram_during_avg_mb,
                ram_peak_mb = excluded.ram_peak_mb,
                exit_code = excluded.exit_code,
                warnings_count = excluded.warnings_count,
                errors_count = excluded.errors_count,
                output_size_kb = excluded.output_size_kb,
                environment_version = excluded.environment_version,
                toolchain_version = excluded.toolchain_version,
                scheme_name = excluded.scheme_name
            "#
        );

        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.operation)
            .bind(record.timestamp.timestamp_millis())
            .bind(record.duration_seconds.max(0.0))
            .bind(record.cpu_before)
            .bind(record.cpu_during_avg)
            .bind(record.cpu_peak)
            .bind(record.ram_before_mb as i64)
            .bind(record.ram_during_avg_mb as i64)
            .bind(record.ram_peak_mb as i64)
            .bind(i64::from(record.exit_code))
            .bind(i64::from(record.warnings_count))
            .bind(i64::from(record.errors_count))
            .bind(record.output_size_kb as i64)
            .bind(&record.environment_version)
            .bind(&record.toolchain_version)
            .bind(record.scheme.as_deref().unwrap_or(""))
            .execute(&self.pool)
            .await
            .map_err(db_error("save"))?;

        debug!(duration = %record.formatted_duration(), "Saved metrics record");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<MetricsRecord>> {
        let sql =
            format!("SELECT {RECORD_COLUMNS} FROM metrics ORDER BY timestamp DESC, rowid DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(db_error("fetch_all"))?;

        Self::rows_to_records(rows)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, operation: &str, limit: u32) -> Result<Vec<MetricsRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM metrics WHERE operation = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(operation)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch"))?;

        Self::rows_to_records(rows)
    }

    #[instrument(skip(self))]
    async fn fetch_last(&self) -> Result<Option<MetricsRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM metrics ORDER BY timestamp DESC, rowid DESC LIMIT 1"
        );
        let row =
            sqlx::query(&sql).fetch_optional(&self.pool).await.map_err(db_error("fetch_last"))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    #[instrument(skip(self))]
    async fn stats(&self, operation: &str) -> Result<Option<MetricsStats>> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as execution_count,
                AVG(duration_seconds) as avg_duration,
                AVG(cpu_during_avg) as avg_cpu,
                AVG(ram_during_avg_mb) as avg_ram,
                AVG(CASE WHEN exit_code = 0 THEN 1.0 ELSE 0.0 END) as success_rate
            FROM metrics
            WHERE operation = ?
            "#,
        )
        .bind(operation)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("stats"))?;

        let get_err = |e: sqlx::Error| MeterError::storage("stats", e);
        let execution_count: i64 = row.try_get("execution_count").map_err(get_err)?;
        if execution_count == 0 {
            return Ok(None);
        }

        let avg = |column: &str| -> Result<f64> {
            Ok(row.try_get::<Option<f64>, _>(column).map_err(get_err)?.unwrap_or(0.0))
        };

        Ok(Some(MetricsStats {
            operation: operation.to_string(),
            execution_count: execution_count as u64,
            avg_duration: avg("avg_duration")?,
            avg_cpu: avg("avg_cpu")?,
            avg_ram_mb: avg("avg_ram")?,
            success_rate: avg("success_rate")?,
        }))
    }

    #[instrument(skip(self))]
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metrics WHERE timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(db_error("cleanup"))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted, "Cleaned up old metrics records");
        }

        Ok(deleted)
    }
}
