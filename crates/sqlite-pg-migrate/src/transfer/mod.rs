//! Per-table migration: introspect, prepare, stream, finalize.
//!
//! Rows are written in batches, one transaction per batch. When the
//! destination rejects a batch, the batch is rolled back and replayed row by
//! row so that only the offending rows are lost. Anything other than a data
//! rejection (lost connection, read error, cancellation) ends the table.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coerce::{Coercer, CoercionStats};
use crate::config::Config;
use crate::core::schema::{ColumnDescriptor, ResolvedType, SchemaColumn, TableOutcome, TableSchema};
use crate::core::traits::{ReadOptions, SourceReader, TargetWriter};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::report::{LogSink, MigrationWarning, ProgressSink, RowFailure};
use crate::typemap::sqlite_to_postgres;

/// Table migrator configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Destination schema.
    pub target_schema: String,
    /// Rows per batch.
    pub batch_size: usize,
    /// Create the destination table when it does not exist.
    pub create_missing_tables: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            target_schema: "public".to_string(),
            batch_size: 500,
            create_missing_tables: true,
        }
    }
}

impl From<&Config> for TransferConfig {
    fn from(config: &Config) -> Self {
        Self {
            target_schema: config.target.schema.clone(),
            batch_size: config.migration.batch_size,
            create_missing_tables: config.migration.create_missing_tables,
        }
    }
}

/// Migrates one table at a time from a source to a destination handle.
pub struct TableMigrator<'a> {
    source: &'a dyn SourceReader,
    target: &'a dyn TargetWriter,
    config: TransferConfig,
    progress: &'a dyn ProgressSink,
    log: &'a dyn LogSink,
    cancel: CancellationToken,
    coercer: Coercer,
}

impl<'a> TableMigrator<'a> {
    pub fn new(
        source: &'a dyn SourceReader,
        target: &'a dyn TargetWriter,
        config: TransferConfig,
        progress: &'a dyn ProgressSink,
        log: &'a dyn LogSink,
    ) -> Self {
        Self {
            source,
            target,
            config,
            progress,
            log,
            cancel: CancellationToken::new(),
            coercer: Coercer::new(),
        }
    }

    /// Observe `token` between batches and between replayed rows.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Value-cleaning counters accumulated over every table so far.
    pub fn coercion_stats(&self) -> CoercionStats {
        self.coercer.stats()
    }

    /// Migrate one table. Never fails: problems are reported in the outcome
    /// and through the log sink.
    pub async fn migrate(&mut self, table: &str) -> TableOutcome {
        let mut outcome = TableOutcome::new(table);

        // Introspecting
        let (columns, total_rows) = match self.introspect(table).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}: introspection failed: {}", table, e);
                let outcome = outcome.abort(e.to_string());
                self.progress.table_finished(&outcome);
                return outcome;
            }
        };
        outcome.total_rows = total_rows;

        if columns.is_empty() {
            self.log.warn(&MigrationWarning::SkippedTable {
                table: table.to_string(),
                reason: "table has no columns".to_string(),
            });
            outcome.skipped = true;
            self.progress.table_finished(&outcome);
            return outcome;
        }

        info!(
            "Migrating {} ({} rows, {} columns)",
            table,
            total_rows,
            columns.len()
        );
        self.progress.table_started(table, total_rows);

        // Preparing
        let schema = self.prepare(table, columns).await;

        // Streaming
        if total_rows > 0 {
            if let Err(e) = self.stream(table, &schema, &mut outcome).await {
                warn!("{}: aborted: {}", table, e);
                outcome.cancelled = matches!(e, MigrateError::Cancelled);
                outcome = outcome.abort(e.to_string());
            }
        }

        // Finalizing
        info!(
            "{}: {} - {} of {} rows attempted, {} failed",
            table,
            outcome.status(),
            outcome.processed_rows,
            outcome.total_rows,
            outcome.failed_rows
        );
        self.progress.table_finished(&outcome);
        outcome
    }

    async fn introspect(&self, table: &str) -> Result<(Vec<ColumnDescriptor>, i64)> {
        let columns = self.source.columns(table).await?;
        if columns.is_empty() {
            return Ok((columns, 0));
        }
        let total_rows = self.source.row_count(table).await?;
        Ok((columns, total_rows))
    }

    /// Build the table schema and get the destination ready. Every step is
    /// best effort; failures become warnings.
    async fn prepare(&self, table: &str, columns: Vec<ColumnDescriptor>) -> TableSchema {
        let schema_name = self.config.target_schema.as_str();

        let mut existing = match self.target.column_types(schema_name, table).await {
            Ok(types) => types,
            Err(e) => {
                self.preparation_warning(table, "column type lookup", &e);
                HashMap::new()
            }
        };

        let mut schema = TableSchema {
            columns: Vec::with_capacity(columns.len()),
        };
        for descriptor in columns {
            let mapping = sqlite_to_postgres(&descriptor.source_type);
            if mapping.warning.is_some() {
                self.log.warn(&MigrationWarning::UnknownType {
                    table: table.to_string(),
                    column: descriptor.name.clone(),
                    source_type: descriptor.source_type.clone(),
                });
            }
            schema.columns.push(SchemaColumn {
                descriptor,
                mapped: mapping.column_type,
                resolved: ResolvedType::Column(mapping.column_type),
            });
        }

        if existing.is_empty() && self.config.create_missing_tables {
            match self.target.table_exists(schema_name, table).await {
                Ok(true) => {}
                Ok(false) => {
                    match self
                        .target
                        .create_table(schema_name, table, &schema.columns)
                        .await
                    {
                        Ok(()) => {
                            if let Ok(types) = self.target.column_types(schema_name, table).await {
                                existing = types;
                            }
                        }
                        Err(e) => self.preparation_warning(table, "create table", &e),
                    }
                }
                Err(e) => self.preparation_warning(table, "table existence check", &e),
            }
        }

        for col in &mut schema.columns {
            if let Some(resolved) = existing
                .get(&col.descriptor.name.to_lowercase())
                .and_then(|t| ResolvedType::from_pg_data_type(t))
            {
                col.resolved = resolved;
            }
            debug!(
                "{}.{}: {} -> {} (resolved {})",
                table, col.descriptor.name, col.descriptor.source_type, col.mapped, col.resolved
            );
        }

        if let Err(e) = self.target.truncate_table(schema_name, table).await {
            self.preparation_warning(table, "truncate", &e);
        }

        schema
    }

    fn preparation_warning(&self, table: &str, step: &str, e: &MigrateError) {
        self.log.warn(&MigrationWarning::SchemaPreparation {
            table: table.to_string(),
            step: step.to_string(),
            message: e.to_string(),
        });
    }

    async fn stream(
        &mut self,
        table: &str,
        schema: &TableSchema,
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        let cols = schema.column_names();
        let mut rx = self.source.read_table(ReadOptions {
            table: table.to_string(),
            columns: cols.clone(),
            batch_size: self.config.batch_size,
        });

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(MigrateError::Cancelled),
                next = rx.recv() => next,
            };
            let batch = match next {
                Some(batch) => batch?,
                None => break,
            };

            let batch_len = batch.len() as i64;
            let offset = batch.offset;

            match self.coercer.clean_batch(batch.rows, schema, self.log) {
                Ok(rows) => {
                    self.write_batch(table, &cols, &rows, offset, outcome).await?;
                }
                Err(fault) => {
                    self.log.warn(&MigrationWarning::BatchSkipped {
                        table: table.to_string(),
                        first_row: offset + 1,
                        rows: batch_len as usize,
                        reason: fault.to_string(),
                    });
                    outcome.failed = true;
                    outcome.failed_rows += batch_len;
                }
            }

            outcome.processed_rows += batch_len;
            self.report_progress(table, outcome);
        }

        Ok(())
    }

    fn report_progress(&self, table: &str, outcome: &TableOutcome) {
        self.progress.rows_attempted(
            table,
            outcome.processed_rows.min(outcome.total_rows),
            outcome.total_rows,
        );
    }

    /// Write one cleaned batch, falling back to row-by-row replay when the
    /// destination rejects it.
    async fn write_batch(
        &self,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
        offset: i64,
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        let schema = self.config.target_schema.as_str();

        match self.insert_batch_in_transaction(table, cols, rows).await {
            Ok(()) => {
                debug!("{}: committed {} rows at offset {}", table, rows.len(), offset);
                Ok(())
            }
            Err(e) if e.is_data_rejection() => {
                self.log.warn(&MigrationWarning::BatchWriteFailed {
                    table: table.to_string(),
                    first_row: offset + 1,
                    rows: rows.len(),
                    message: e.to_string(),
                });
                self.replay(schema, table, cols, rows, offset, outcome).await
            }
            Err(e) => Err(e),
        }
    }

    async fn insert_batch_in_transaction(
        &self,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<()> {
        let schema = self.config.target_schema.as_str();
        self.target.begin().await?;
        let result = match self.target.insert_batch(schema, table, cols, rows).await {
            Ok(_) => self.target.commit().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = self.target.rollback().await;
        }
        result
    }

    async fn insert_row_in_transaction(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        row: &[SqlValue],
    ) -> Result<()> {
        self.target.begin().await?;
        let result = match self.target.insert_row(schema, table, cols, row).await {
            Ok(()) => self.target.commit().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = self.target.rollback().await;
        }
        result
    }

    /// Insert and commit each row on its own, recording every rejection.
    async fn replay(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
        offset: i64,
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        let mut failed = 0usize;

        for (i, row) in rows.iter().enumerate() {
            if i > 0 && self.cancel.is_cancelled() {
                outcome.processed_rows += i as i64;
                return Err(MigrateError::Cancelled);
            }

            let row_index = offset + i as i64 + 1;
            match self.insert_row_in_transaction(schema, table, cols, row).await {
                Ok(()) => {}
                Err(e) if e.is_data_rejection() => {
                    failed += 1;
                    outcome.failed = true;
                    outcome.failed_rows += 1;
                    self.log.warn(&MigrationWarning::RowWriteFailed(row_failure(
                        table, row_index, cols, row, &e,
                    )));
                }
                Err(e) => {
                    outcome.processed_rows += i as i64;
                    return Err(e);
                }
            }
        }

        info!(
            "{}: replayed {} rows starting at row {}, {} rejected",
            table,
            rows.len(),
            offset + 1,
            failed
        );
        Ok(())
    }
}

fn row_failure(
    table: &str,
    row_index: i64,
    cols: &[String],
    row: &[SqlValue],
    e: &MigrateError,
) -> RowFailure {
    let preview = cols
        .iter()
        .zip(row)
        .map(|(c, v)| (c.clone(), v.preview()))
        .collect();

    match e.write_error() {
        Some(we) => RowFailure {
            table: table.to_string(),
            row_index,
            sqlstate: we.code.clone(),
            message: we.message.clone(),
            detail: we.detail.clone(),
            hint: we.hint.clone(),
            column: we.column.clone(),
            constraint: we.constraint.clone(),
            preview,
        },
        None => RowFailure {
            table: table.to_string(),
            row_index,
            sqlstate: None,
            message: e.to_string(),
            detail: None,
            hint: None,
            column: None,
            constraint: None,
            preview,
        },
    }
}
