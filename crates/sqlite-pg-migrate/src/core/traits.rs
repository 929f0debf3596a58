//! Handle contracts between the migration engine and the two databases.
//!
//! - [`SourceReader`]: reads schema and rows from the source database
//! - [`TargetWriter`]: writes schema and rows to the destination database
//!
//! The engine only talks to these traits, so the table migrator can be
//! driven against in-memory implementations in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{ColumnDescriptor, SchemaColumn};
use super::value::{Batch, SqlValue};

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Table name.
    pub table: String,
    /// Columns to read, in the order rows are produced.
    pub columns: Vec<String>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            table: String::new(),
            columns: Vec::new(),
            batch_size: 500,
        }
    }
}

/// Read schema and data from the source database.
///
/// # Streaming
///
/// [`read_table`](SourceReader::read_table) returns a channel receiver for
/// streaming batches. The reader spawns a background task that fills the
/// channel, so the next batch is read while the current one is written.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List user tables, excluding the engine's internal tables.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column descriptors of a table, in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Start streaming rows from a table.
    ///
    /// Rows are yielded in the column order given in `opts`. A read error
    /// is delivered as the last item of the channel.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>>;

    /// Whether the handle was opened read-only.
    fn is_read_only(&self) -> bool;

    /// Get the database type identifier (e.g., "sqlite").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// Write schema and data to the destination database.
///
/// Data writes happen only between [`begin`](TargetWriter::begin) and
/// [`commit`](TargetWriter::commit) / [`rollback`](TargetWriter::rollback).
/// Transactions are never nested.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    // ===== Schema Operations =====

    /// Check if a table exists.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Existing column types of a table, keyed by lower-cased column name.
    ///
    /// Values are lower-cased `information_schema` data type names. Returns
    /// an empty map for a table that does not exist.
    async fn column_types(&self, schema: &str, table: &str) -> Result<HashMap<String, String>>;

    /// Create a table from a mapped schema.
    async fn create_table(&self, schema: &str, table: &str, columns: &[SchemaColumn])
        -> Result<()>;

    /// Remove all rows and reset identity sequences, in its own transaction.
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()>;

    // ===== Transactions =====

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    // ===== Data Operations =====

    /// Insert many rows with multi-row INSERT statements.
    ///
    /// Must be called inside a transaction. Returns the number of rows
    /// written.
    async fn insert_batch(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64>;

    /// Insert a single row. Must be called inside a transaction.
    async fn insert_row(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        row: &[SqlValue],
    ) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}
