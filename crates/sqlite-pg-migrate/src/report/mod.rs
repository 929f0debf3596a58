//! Progress and diagnostic reporting.
//!
//! The engine never prints. Progress goes to a [`ProgressSink`] and
//! non-fatal problems go to a [`LogSink`] as structured
//! [`MigrationWarning`]s; both are supplied by the caller.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::TableOutcome;
use crate::orchestrator::RunSummary;

/// Receives progress notifications from the engine.
///
/// `rows_attempted` is monotonic per table and never exceeds the table's
/// total.
pub trait ProgressSink: Send + Sync {
    fn table_started(&self, table: &str, total_rows: i64);

    fn rows_attempted(&self, table: &str, attempted: i64, total_rows: i64);

    fn table_finished(&self, outcome: &TableOutcome);

    fn run_finished(&self, summary: &RunSummary);
}

/// Progress sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn table_started(&self, _table: &str, _total_rows: i64) {}

    fn rows_attempted(&self, _table: &str, _attempted: i64, _total_rows: i64) {}

    fn table_finished(&self, _outcome: &TableOutcome) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Progress event, serialized one per line by [`JsonLinesProgress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TableStarted {
        table: String,
        total_rows: i64,
    },
    RowsAttempted {
        table: String,
        attempted: i64,
        total_rows: i64,
    },
    TableFinished {
        table: String,
        status: String,
        processed_rows: i64,
        total_rows: i64,
        failed_rows: i64,
    },
    RunFinished {
        run_id: String,
        status: String,
        succeeded: usize,
        failed: usize,
        duration_seconds: f64,
    },
}

impl ProgressEvent {
    fn from_outcome(outcome: &TableOutcome) -> Self {
        ProgressEvent::TableFinished {
            table: outcome.table_name.clone(),
            status: outcome.status().to_string(),
            processed_rows: outcome.processed_rows,
            total_rows: outcome.total_rows,
            failed_rows: outcome.failed_rows,
        }
    }

    fn from_summary(summary: &RunSummary) -> Self {
        ProgressEvent::RunFinished {
            run_id: summary.run_id.clone(),
            status: summary.status.to_string(),
            succeeded: summary.succeeded_count,
            failed: summary.failed_tables.len(),
            duration_seconds: summary.elapsed.as_secs_f64(),
        }
    }
}

/// Writes progress events as JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesProgress;

impl JsonLinesProgress {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }
}

impl ProgressSink for JsonLinesProgress {
    fn table_started(&self, table: &str, total_rows: i64) {
        self.emit(&ProgressEvent::TableStarted {
            table: table.to_string(),
            total_rows,
        });
    }

    fn rows_attempted(&self, table: &str, attempted: i64, total_rows: i64) {
        self.emit(&ProgressEvent::RowsAttempted {
            table: table.to_string(),
            attempted,
            total_rows,
        });
    }

    fn table_finished(&self, outcome: &TableOutcome) {
        self.emit(&ProgressEvent::from_outcome(outcome));
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.emit(&ProgressEvent::from_summary(summary));
    }
}

/// Diagnostics for one row that the destination rejected during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub table: String,
    /// 1-based position of the row within the table.
    pub row_index: i64,
    pub sqlstate: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
    /// `(column, value preview)` for every cell of the row.
    pub preview: Vec<(String, String)>,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} of {} failed", self.row_index, self.table)?;
        match &self.sqlstate {
            Some(code) => write!(f, ": [{}] {}", code, self.message)?,
            None => write!(f, ": {}", self.message)?,
        }
        if let Some(detail) = &self.detail {
            write!(f, " (detail: {})", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

/// A non-fatal problem encountered during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationWarning {
    /// A declared source type was not recognized and mapped to TEXT.
    UnknownType {
        table: String,
        column: String,
        source_type: String,
    },
    /// A cell could not be represented in its target type and became NULL.
    ValueNulled {
        column: String,
        expected: String,
        preview: String,
    },
    /// A best-effort preparation step (type lookup, create, truncate) failed.
    SchemaPreparation {
        table: String,
        step: String,
        message: String,
    },
    /// A batch insert was rejected; the batch is replayed row by row.
    BatchWriteFailed {
        table: String,
        first_row: i64,
        rows: usize,
        message: String,
    },
    /// A single row was rejected during replay.
    RowWriteFailed(RowFailure),
    /// A batch could not be cleaned and was not written.
    BatchSkipped {
        table: String,
        first_row: i64,
        rows: usize,
        reason: String,
    },
    /// A table was not migrated.
    SkippedTable { table: String, reason: String },
}

impl fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationWarning::UnknownType {
                table,
                column,
                source_type,
            } => write!(
                f,
                "{}.{}: unknown source type '{}', mapped to TEXT",
                table, column, source_type
            ),
            MigrationWarning::ValueNulled {
                column,
                expected,
                preview,
            } => write!(
                f,
                "column '{}' expects {}, got '{}'; mapped to NULL",
                column, expected, preview
            ),
            MigrationWarning::SchemaPreparation {
                table,
                step,
                message,
            } => write!(f, "{}: {} failed: {}", table, step, message),
            MigrationWarning::BatchWriteFailed {
                table,
                first_row,
                rows,
                message,
            } => write!(
                f,
                "{}: batch of {} rows starting at row {} failed, replaying row by row: {}",
                table, rows, first_row, message
            ),
            MigrationWarning::RowWriteFailed(failure) => fmt::Display::fmt(failure, f),
            MigrationWarning::BatchSkipped {
                table,
                first_row,
                rows,
                reason,
            } => write!(
                f,
                "{}: skipped batch of {} rows starting at row {}: {}",
                table, rows, first_row, reason
            ),
            MigrationWarning::SkippedTable { table, reason } => {
                write!(f, "skipping table {}: {}", table, reason)
            }
        }
    }
}

/// Receives non-fatal warnings. Implementations must not fail or panic.
pub trait LogSink: Send + Sync {
    fn warn(&self, warning: &MigrationWarning);
}

/// Forwards warnings to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn warn(&self, warning: &MigrationWarning) {
        match warning {
            MigrationWarning::UnknownType {
                table,
                column,
                source_type,
            } => warn!(table = %table, column = %column, source_type = %source_type, "{}", warning),
            MigrationWarning::ValueNulled { column, .. } => {
                warn!(column = %column, "{}", warning)
            }
            MigrationWarning::SchemaPreparation { table, step, .. } => {
                warn!(table = %table, step = %step, "{}", warning)
            }
            MigrationWarning::BatchWriteFailed {
                table, first_row, ..
            } => warn!(table = %table, first_row, "{}", warning),
            MigrationWarning::RowWriteFailed(failure) => {
                let preview = failure
                    .preview
                    .iter()
                    .map(|(col, val)| format!("{}={}", col, val))
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(
                    table = %failure.table,
                    row = failure.row_index,
                    sqlstate = failure.sqlstate.as_deref().unwrap_or("N/A"),
                    column = failure.column.as_deref().unwrap_or(""),
                    constraint = failure.constraint.as_deref().unwrap_or(""),
                    preview = %preview,
                    "{}",
                    warning
                )
            }
            MigrationWarning::BatchSkipped {
                table, first_row, ..
            } => warn!(table = %table, first_row, "{}", warning),
            MigrationWarning::SkippedTable { table, .. } => warn!(table = %table, "{}", warning),
        }
    }
}

/// Keeps every warning in memory.
#[derive(Debug, Default)]
pub struct CollectingLogSink {
    warnings: Mutex<Vec<MigrationWarning>>,
}

impl CollectingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the warnings received so far.
    pub fn warnings(&self) -> Vec<MigrationWarning> {
        match self.warnings.lock() {
            Ok(w) => w.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.warnings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for CollectingLogSink {
    fn warn(&self, warning: &MigrationWarning) {
        match self.warnings.lock() {
            Ok(mut w) => w.push(warning.clone()),
            Err(poisoned) => poisoned.into_inner().push(warning.clone()),
        }
    }
}
