//! # sqlite-pg-migrate
//!
//! One-shot SQLite to PostgreSQL bulk migration library.
//!
//! Tables are migrated one at a time in fixed-size batches:
//!
//! - **Type mapping** from SQLite declared types to PostgreSQL column types
//! - **Value cleaning** of SQLite storage classes (0/1 booleans, JSON text,
//!   embedded NUL characters)
//! - **Row-level fault isolation**: a rejected batch is rolled back and
//!   replayed row by row, so one bad row costs one row
//! - **Structured reporting** of progress and warnings through caller-supplied
//!   sinks
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, ConnectionPair, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let pair = ConnectionPair::acquire(&config.source, &config.target).await?;
//!     let summary = Orchestrator::from_pair(&pair, &config).run().await?;
//!     pair.close().await;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod connection;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use coerce::{coerce, Coercer, CoercionStats};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use connection::ConnectionPair;
pub use crate::core::{
    Batch, ColumnDescriptor, ColumnType, RawValue, ResolvedType, SourceReader, SqlValue,
    TableOutcome, TableSchema, TargetWriter,
};
pub use drivers::common::SslMode;
pub use drivers::postgres::PostgresWriter;
pub use drivers::sqlite::{IntegrityReport, SqliteReader};
pub use error::{MigrateError, Result, WriteError};
pub use orchestrator::{health_check, HealthCheckResult, Orchestrator, RunStatus, RunSummary};
pub use report::{
    CollectingLogSink, JsonLinesProgress, LogSink, MigrationWarning, NoopProgress, ProgressSink,
    RowFailure, TracingLogSink,
};
pub use transfer::{TableMigrator, TransferConfig};
pub use typemap::{sqlite_to_postgres, TypeMapping};
