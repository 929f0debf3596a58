//! Migration orchestrator - main workflow coordinator.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coerce::CoercionStats;
use crate::config::Config;
use crate::connection::ConnectionPair;
use crate::core::schema::TableOutcome;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::postgres::PostgresWriter;
use crate::drivers::sqlite::SqliteReader;
use crate::error::Result;
use crate::report::{LogSink, NoopProgress, ProgressSink, TracingLogSink};
use crate::transfer::{TableMigrator, TransferConfig};

/// Internal and history tables that are never migrated.
pub const DENYLIST: [&str; 3] = ["migratehistory", "alembic_version", "sqlite_sequence"];

/// Whether a table is on the [`DENYLIST`].
pub fn is_denylisted(table: &str) -> bool {
    DENYLIST.iter().any(|d| d.eq_ignore_ascii_case(table))
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table migrated without row failures.
    Completed,
    /// At least one table failed or lost rows.
    CompletedWithErrors,
    /// The run was interrupted.
    Cancelled,
    /// The source holds no tables to migrate.
    NoTables,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Cancelled => "cancelled",
            RunStatus::NoTables => "no_tables",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// Tables migrated with every row committed, including skipped tables.
    pub succeeded_count: usize,

    /// Tables with at least one uncommitted row, or aborted.
    pub failed_tables: Vec<String>,

    /// Tables with no columns. Counted as succeeded.
    pub skipped_tables: Vec<String>,

    /// Denylisted tables that were not attempted.
    pub excluded_tables: Vec<String>,

    /// Per-table results, in migration order.
    pub outcomes: Vec<TableOutcome>,

    /// Rows attempted across all tables.
    pub rows_processed: i64,

    /// Rows that could not be committed.
    pub rows_failed: i64,

    /// Value cleaning counters.
    pub coercion: CoercionStats,

    /// Total duration.
    #[serde(rename = "duration_seconds", serialize_with = "serialize_secs")]
    pub elapsed: Duration,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when every attempted table committed all its rows.
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::NoTables)
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Completed | RunStatus::NoTables => 0,
            RunStatus::CompletedWithErrors => 1,
            RunStatus::Cancelled => 130,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}: {}", self.run_id, self.status)?;
        writeln!(
            f,
            "  tables: {} succeeded ({} skipped), {} failed",
            self.succeeded_count,
            self.skipped_tables.len(),
            self.failed_tables.len()
        )?;
        writeln!(
            f,
            "  rows:   {} attempted, {} failed",
            self.rows_processed, self.rows_failed
        )?;
        for outcome in &self.outcomes {
            writeln!(
                f,
                "  {:<32} {:>9} {:>10}/{:<10} failed: {}",
                outcome.table_name,
                outcome.status(),
                outcome.processed_rows,
                outcome.total_rows,
                outcome.failed_rows
            )?;
        }
        write!(f, "  elapsed: {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    progress: Arc<dyn ProgressSink>,
    log: Arc<dyn LogSink>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create a new orchestrator over already-open handles.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            progress: Arc::new(NoopProgress),
            log: Arc::new(TracingLogSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Create an orchestrator over a connection pair.
    pub fn from_pair(pair: &ConnectionPair, config: &Config) -> Self {
        Self::new(
            pair.source.clone(),
            pair.target.clone(),
            TransferConfig::from(config),
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Migrate every user table, one at a time.
    ///
    /// Fails only if the source tables cannot be listed. Table-level
    /// failures are reported in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run {} ({} -> {})",
            run_id,
            self.source.db_type(),
            self.target.db_type()
        );

        let all_tables = self.source.list_tables().await?;
        let (excluded, tables): (Vec<String>, Vec<String>) =
            all_tables.into_iter().partition(|t| is_denylisted(t));
        for table in &excluded {
            info!("Skipping internal table {}", table);
        }

        let mut migrator = TableMigrator::new(
            self.source.as_ref(),
            self.target.as_ref(),
            self.config.clone(),
            self.progress.as_ref(),
            self.log.as_ref(),
        )
        .with_cancellation(self.cancel.clone());

        if tables.is_empty() {
            warn!("No tables to migrate");
        } else {
            info!("Found {} tables to migrate", tables.len());
        }

        let mut outcomes = Vec::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "Migration cancelled, {} tables not attempted",
                    tables.len() - i
                );
                break;
            }
            info!("[{}/{}] {}", i + 1, tables.len(), table);
            outcomes.push(migrator.migrate(table).await);
        }

        let interrupted =
            outcomes.len() < tables.len() || outcomes.iter().any(|o| o.cancelled);
        let status = if interrupted {
            RunStatus::Cancelled
        } else if tables.is_empty() {
            RunStatus::NoTables
        } else if outcomes.iter().any(|o| o.failed) {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        let summary = RunSummary {
            run_id,
            status,
            succeeded_count: outcomes.iter().filter(|o| !o.failed).count(),
            failed_tables: outcomes
                .iter()
                .filter(|o| o.failed)
                .map(|o| o.table_name.clone())
                .collect(),
            skipped_tables: outcomes
                .iter()
                .filter(|o| o.skipped)
                .map(|o| o.table_name.clone())
                .collect(),
            excluded_tables: excluded,
            rows_processed: outcomes.iter().map(|o| o.processed_rows).sum(),
            rows_failed: outcomes.iter().map(|o| o.failed_rows).sum(),
            outcomes,
            coercion: migrator.coercion_stats(),
            elapsed: start.elapsed(),
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            "Migration {}: {} tables succeeded, {} failed, {:.1}s",
            summary.status,
            summary.succeeded_count,
            summary.failed_tables.len(),
            summary.elapsed.as_secs_f64()
        );
        for table in &summary.failed_tables {
            warn!("Table {} did not migrate cleanly", table);
        }

        self.progress.run_finished(&summary);
        Ok(summary)
    }
}

/// Connectivity result for one side.
#[derive(Debug, Clone, Serialize)]
pub struct SideHealth {
    pub connected: bool,
    pub latency_ms: u64,
    /// Version or size information when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source: SideHealth,
    pub target: SideHealth,
}

impl HealthCheckResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Open each side independently and report whether it is reachable.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let start = Instant::now();
    let source = match SqliteReader::open(&config.source).await {
        Ok(reader) => {
            let info = reader
                .list_tables()
                .await
                .map(|t| format!("{} tables", t.len()))
                .ok();
            reader.close().await;
            SideHealth {
                connected: true,
                latency_ms: start.elapsed().as_millis() as u64,
                info,
                error: None,
            }
        }
        Err(e) => SideHealth {
            connected: false,
            latency_ms: start.elapsed().as_millis() as u64,
            info: None,
            error: Some(e.to_string()),
        },
    };

    let start = Instant::now();
    let target = match PostgresWriter::connect(&config.target).await {
        Ok(writer) => {
            let info = writer
                .server_version()
                .await
                .map(|v| format!("PostgreSQL {}", v))
                .ok();
            writer.close().await;
            SideHealth {
                connected: true,
                latency_ms: start.elapsed().as_millis() as u64,
                info,
                error: None,
            }
        }
        Err(e) => SideHealth {
            connected: false,
            latency_ms: start.elapsed().as_millis() as u64,
            info: None,
            error: Some(e.to_string()),
        },
    };

    HealthCheckResult {
        healthy: source.connected && target.connected,
        source,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylist() {
        assert!(is_denylisted("migratehistory"));
        assert!(is_denylisted("alembic_version"));
        assert!(is_denylisted("sqlite_sequence"));
        assert!(is_denylisted("Alembic_Version"));
        assert!(!is_denylisted("users"));
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::CompletedWithErrors.to_string(), "completed_with_errors");
        assert_eq!(RunStatus::NoTables.to_string(), "no_tables");
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_summary_json_reports_seconds() {
        let summary = RunSummary {
            run_id: "r1".to_string(),
            status: RunStatus::Completed,
            succeeded_count: 1,
            failed_tables: vec![],
            skipped_tables: vec![],
            excluded_tables: vec!["alembic_version".to_string()],
            outcomes: vec![TableOutcome::new("users")],
            rows_processed: 0,
            rows_failed: 0,
            coercion: CoercionStats::default(),
            elapsed: Duration::from_millis(1500),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["duration_seconds"], 1.5);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["outcomes"][0]["table_name"], "users");
        assert_eq!(summary.exit_code(), 0);
    }
}
