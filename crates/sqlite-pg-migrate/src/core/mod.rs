//! Core abstractions shared by the migration engine and the drivers.
//!
//! - [`schema`]: column and table metadata, per-table outcomes
//! - [`value`]: raw source cells and cleaned destination cells
//! - [`traits`]: the [`SourceReader`] and [`TargetWriter`] handle contracts
//! - [`identifier`]: identifier quoting for generated SQL
//!
//! Driver modules (`drivers/sqlite`, `drivers/postgres`) implement the
//! traits; the table migrator and orchestrator only depend on this module.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{
    ColumnDescriptor, ColumnType, ResolvedType, SchemaColumn, TableOutcome, TableSchema,
};
pub use traits::{ReadOptions, SourceReader, TargetWriter};
pub use value::{Batch, RawValue, SqlValue};
