//! Schema and metadata types for source tables and their target columns.
//!
//! A [`TableSchema`] is built once per table during introspection and never
//! re-derived while the table's rows are streaming: its column order fixes
//! the order of every positional INSERT.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column metadata as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared source type (e.g. "INTEGER", "VARCHAR(20)", "" for none).
    pub source_type: String,

    /// Ordinal position (0-based, as SQLite's `PRAGMA table_info` reports it).
    pub ordinal_position: i32,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, ordinal: i32) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            ordinal_position: ordinal,
        }
    }
}

/// Destination column type, derived from a source type by the type mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    BigInt,
    Text,
    Bytes,
    Double,
    Numeric,
    Boolean,
    Date,
    Time,
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type used in generated DDL.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Bytes => "BYTEA",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME WITHOUT TIME ZONE",
            ColumnType::Timestamp => "TIMESTAMP WITHOUT TIME ZONE",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pg_type())
    }
}

/// The type the value coercer targets for one column.
///
/// JSON never appears in generated DDL (JSON source columns are created as
/// text), but an existing `json`/`jsonb` target column switches the column's
/// values to JSON handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedType {
    Column(ColumnType),
    Json,
}

impl ResolvedType {
    /// Resolve from a target column's `information_schema.columns.data_type`.
    ///
    /// Returns `None` for types the coercer has no special handling for; the
    /// mapped type is used instead.
    pub fn from_pg_data_type(data_type: &str) -> Option<Self> {
        let resolved = match data_type.trim().to_lowercase().as_str() {
            "json" | "jsonb" => ResolvedType::Json,
            "boolean" | "bool" => ResolvedType::Column(ColumnType::Boolean),
            "smallint" | "integer" | "int" | "int4" | "int2" => {
                ResolvedType::Column(ColumnType::Integer)
            }
            "bigint" | "int8" => ResolvedType::Column(ColumnType::BigInt),
            "text" | "character varying" | "character" | "varchar" => {
                ResolvedType::Column(ColumnType::Text)
            }
            "bytea" => ResolvedType::Column(ColumnType::Bytes),
            "double precision" | "real" => ResolvedType::Column(ColumnType::Double),
            "numeric" | "decimal" => ResolvedType::Column(ColumnType::Numeric),
            "date" => ResolvedType::Column(ColumnType::Date),
            "time without time zone" | "time with time zone" | "time" => {
                ResolvedType::Column(ColumnType::Time)
            }
            "timestamp without time zone" | "timestamp with time zone" | "timestamp" => {
                ResolvedType::Column(ColumnType::Timestamp)
            }
            _ => return None,
        };
        Some(resolved)
    }

}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Column(t) => fmt::Display::fmt(t, f),
            ResolvedType::Json => f.write_str("JSON"),
        }
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub descriptor: ColumnDescriptor,
    /// Type produced by the type mapper (used for DDL).
    pub mapped: ColumnType,
    /// Type the coercer targets.
    pub resolved: ResolvedType,
}

impl SchemaColumn {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Ordered column list of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<SchemaColumn>,
}

impl TableSchema {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.descriptor.name.clone()).collect()
    }
}

/// Final result of migrating one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table_name: String,

    /// Source row count at introspection time.
    pub total_rows: i64,

    /// Rows attempted, including rows that failed during replay.
    pub processed_rows: i64,

    /// Rows that could not be committed.
    pub failed_rows: i64,

    /// True if any row could not be committed or the table aborted.
    pub failed: bool,

    /// Table had no columns and was skipped.
    #[serde(default)]
    pub skipped: bool,

    /// Stopped by cancellation before all rows were attempted.
    #[serde(default)]
    pub cancelled: bool,

    /// Reason the table was aborted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            total_rows: 0,
            processed_rows: 0,
            failed_rows: 0,
            failed: false,
            skipped: false,
            cancelled: false,
            error: None,
        }
    }

    /// Mark the table as aborted with the given reason.
    pub fn abort(mut self, reason: impl Into<String>) -> Self {
        self.failed = true;
        self.error = Some(reason.into());
        self
    }

    /// Short human-readable status line.
    pub fn status(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else if self.error.is_some() {
            "failed"
        } else if self.failed {
            "partial"
        } else {
            "migrated"
        }
    }
}
