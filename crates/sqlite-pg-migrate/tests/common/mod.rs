//! Shared fixtures: SQLite source files and an in-memory destination.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sqlite_pg_migrate::core::schema::SchemaColumn;
use sqlite_pg_migrate::orchestrator::RunSummary;
use sqlite_pg_migrate::{
    MigrateError, ProgressSink, Result, SourceConfig, SqlValue, SqliteReader, TableOutcome,
    TargetWriter, WriteError,
};

/// A SQLite file in a temporary directory.
pub struct SourceDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl SourceDb {
    /// Create a database file and run `statements` against it.
    pub async fn create(statements: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        for stmt in statements {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool.close().await;
        Self { _dir: dir, path }
    }

    pub async fn reader(&self) -> SqliteReader {
        SqliteReader::open(&SourceConfig::new(&self.path))
            .await
            .unwrap()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct MemColumn {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub columns: Vec<MemColumn>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MemTable>,
    in_transaction: bool,
    staged: Vec<(String, Vec<SqlValue>)>,
}

/// Counters of calls made against a [`MemoryWriter`].
#[derive(Debug, Default)]
pub struct Calls {
    pub batch_inserts: AtomicUsize,
    pub row_inserts: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub truncates: AtomicUsize,
    pub creates: AtomicUsize,
}

/// Transactional in-memory destination enforcing NOT NULL, boolean and JSON
/// column types.
#[derive(Default)]
pub struct MemoryWriter {
    state: Mutex<State>,
    pub calls: Calls,
    /// Number of insert calls that succeed before the connection drops.
    lose_connection_after: Option<usize>,
    inserts_seen: AtomicUsize,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a table. Columns are `(name, data_type, not_null)`.
    pub fn with_table(self, name: &str, columns: &[(&str, &str, bool)]) -> Self {
        let table = MemTable {
            columns: columns
                .iter()
                .map(|(n, t, nn)| MemColumn {
                    name: n.to_string(),
                    data_type: t.to_string(),
                    not_null: *nn,
                })
                .collect(),
            rows: Vec::new(),
        };
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(name.to_string(), table);
        self
    }

    /// Drop the connection once `n` insert calls have succeeded.
    pub fn lose_connection_after(mut self, n: usize) -> Self {
        self.lose_connection_after = Some(n);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_transaction
    }

    fn check_connection(&self) -> Result<()> {
        if let Some(limit) = self.lose_connection_after {
            if self.inserts_seen.load(Ordering::SeqCst) >= limit {
                return Err(WriteError::connection_lost("connection closed").into());
            }
        }
        Ok(())
    }

    fn validate(table: &MemTable, cols: &[String], row: &[SqlValue]) -> Result<()> {
        if cols.len() != row.len() {
            return Err(WriteError::rejected("column/value count mismatch").into());
        }
        for (name, value) in cols.iter().zip(row) {
            let column = table
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    MigrateError::from(WriteError {
                        code: Some("42703".to_string()),
                        message: format!("column \"{}\" does not exist", name),
                        ..Default::default()
                    })
                })?;

            if value.is_null() {
                if column.not_null {
                    return Err(WriteError {
                        code: Some("23502".to_string()),
                        message: format!(
                            "null value in column \"{}\" violates not-null constraint",
                            column.name
                        ),
                        detail: Some("Failing row contains (...).".to_string()),
                        column: Some(column.name.clone()),
                        ..Default::default()
                    }
                    .into());
                }
                continue;
            }

            let ok = match column.data_type.as_str() {
                "boolean" => matches!(value, SqlValue::Bool(_)),
                "json" | "jsonb" => matches!(value, SqlValue::Json(_)),
                _ => true,
            };
            if !ok {
                return Err(WriteError {
                    code: Some("42804".to_string()),
                    message: format!(
                        "column \"{}\" is of type {} but expression is {}",
                        column.name, column.data_type, value
                    ),
                    ..Default::default()
                }
                .into());
            }
        }
        Ok(())
    }

    fn stage(&self, table: &str, cols: &[String], rows: &[Vec<SqlValue>]) -> Result<()> {
        self.check_connection()?;
        self.inserts_seen.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        assert!(state.in_transaction, "insert outside a transaction");
        let mem = state.tables.get(table).ok_or_else(|| {
            MigrateError::from(WriteError {
                code: Some("42P01".to_string()),
                message: format!("relation \"{}\" does not exist", table),
                ..Default::default()
            })
        })?;
        for row in rows {
            Self::validate(mem, cols, row)?;
        }
        for row in rows {
            state.staged.push((table.to_string(), row.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for MemoryWriter {
    async fn table_exists(&self, _schema: &str, table: &str) -> Result<bool> {
        Ok(self.has_table(table))
    }

    async fn column_types(&self, _schema: &str, table: &str) -> Result<HashMap<String, String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| (c.name.to_lowercase(), c.data_type.to_lowercase()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_table(
        &self,
        _schema: &str,
        table: &str,
        columns: &[SchemaColumn],
    ) -> Result<()> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        let mem = MemTable {
            columns: columns
                .iter()
                .map(|c| MemColumn {
                    name: c.name().to_string(),
                    data_type: c.mapped.pg_type().to_lowercase(),
                    not_null: false,
                })
                .collect(),
            rows: Vec::new(),
        };
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_insert(mem);
        Ok(())
    }

    async fn truncate_table(&self, _schema: &str, table: &str) -> Result<()> {
        self.calls.truncates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        match state.tables.get_mut(table) {
            Some(t) => {
                t.rows.clear();
                Ok(())
            }
            None => Err(WriteError {
                code: Some("42P01".to_string()),
                message: format!("relation \"{}\" does not exist", table),
                ..Default::default()
            }
            .into()),
        }
    }

    async fn begin(&self) -> Result<()> {
        self.check_connection()?;
        let mut state = self.state.lock().unwrap();
        assert!(!state.in_transaction, "nested transaction");
        state.in_transaction = true;
        state.staged.clear();
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.in_transaction = false;
        let staged = std::mem::take(&mut state.staged);
        for (table, row) in staged {
            if let Some(t) = state.tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.in_transaction = false;
        state.staged.clear();
        Ok(())
    }

    async fn insert_batch(
        &self,
        _schema: &str,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        self.calls.batch_inserts.fetch_add(1, Ordering::SeqCst);
        self.stage(table, cols, rows)?;
        Ok(rows.len() as u64)
    }

    async fn insert_row(
        &self,
        _schema: &str,
        table: &str,
        cols: &[String],
        row: &[SqlValue],
    ) -> Result<()> {
        self.calls.row_inserts.fetch_add(1, Ordering::SeqCst);
        self.stage(table, cols, &[row.to_vec()])
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Progress sink that records every notification.
#[derive(Default)]
pub struct RecordingProgress {
    pub started: Mutex<Vec<(String, i64)>>,
    pub attempted: Mutex<Vec<(String, i64)>>,
    pub finished: Mutex<Vec<(String, String)>>,
    pub runs: Mutex<Vec<String>>,
    /// Cancelled on the first `rows_attempted` notification.
    cancel_on_progress: Option<CancellationToken>,
    /// Cancelled once any table finishes.
    cancel_on_finish: Option<CancellationToken>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_progress: Some(token),
            ..Default::default()
        }
    }

    pub fn cancelling_on_finish(token: CancellationToken) -> Self {
        Self {
            cancel_on_finish: Some(token),
            ..Default::default()
        }
    }

    pub fn attempted_for(&self, table: &str) -> Vec<i64> {
        self.attempted
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn table_started(&self, table: &str, total_rows: i64) {
        self.started
            .lock()
            .unwrap()
            .push((table.to_string(), total_rows));
    }

    fn rows_attempted(&self, table: &str, attempted: i64, _total_rows: i64) {
        self.attempted
            .lock()
            .unwrap()
            .push((table.to_string(), attempted));
        if let Some(token) = &self.cancel_on_progress {
            token.cancel();
        }
    }

    fn table_finished(&self, outcome: &TableOutcome) {
        self.finished
            .lock()
            .unwrap()
            .push((outcome.table_name.clone(), outcome.status().to_string()));
        if let Some(token) = &self.cancel_on_finish {
            token.cancel();
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.runs.lock().unwrap().push(summary.status.to_string());
    }
}
