//! Per-cell value cleaning between SQLite storage classes and PostgreSQL
//! column types.
//!
//! Cleaning never fails on a value: anything that cannot be represented in
//! its target column becomes NULL and is reported to the [`LogSink`]. The only
//! failure is structural, a row whose width does not match the schema.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::value::preview;
use crate::core::{ColumnType, RawValue, ResolvedType, SqlValue, TableSchema};
use crate::report::{LogSink, MigrationWarning};

/// Counts of values changed during cleaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    /// Integers other than 0/1 bound for a BOOLEAN column.
    pub nulled_booleans: u64,
    /// Non-empty text that failed to parse for a JSON column.
    pub nulled_json: u64,
    /// Text values that had NUL characters removed.
    pub stripped_nul: u64,
}

/// A row could not be lined up with the table's columns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("row has {found} values but the table has {expected} columns")]
pub struct CleaningFault {
    pub expected: usize,
    pub found: usize,
}

/// Value cleaner with diagnostic counters.
#[derive(Debug, Default)]
pub struct Coercer {
    stats: CoercionStats,
}

impl Coercer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CoercionStats {
        self.stats
    }

    /// Convert one raw cell into a value acceptable for `target`.
    pub fn coerce(
        &mut self,
        value: RawValue,
        target: ResolvedType,
        column: &str,
        log: &dyn LogSink,
    ) -> SqlValue {
        match (value, target) {
            (RawValue::Null, _) => SqlValue::Null,

            (RawValue::Integer(v), ResolvedType::Column(ColumnType::Boolean)) => match v {
                0 => SqlValue::Bool(false),
                1 => SqlValue::Bool(true),
                other => {
                    self.stats.nulled_booleans += 1;
                    log.warn(&MigrationWarning::ValueNulled {
                        column: column.to_string(),
                        expected: "boolean".to_string(),
                        preview: other.to_string(),
                    });
                    SqlValue::Null
                }
            },

            (RawValue::Text(s), ResolvedType::Json) => match serde_json::from_str(&s) {
                Ok(parsed) => SqlValue::Json(parsed),
                Err(_) if s.trim().is_empty() => SqlValue::Null,
                Err(_) => {
                    self.stats.nulled_json += 1;
                    log.warn(&MigrationWarning::ValueNulled {
                        column: column.to_string(),
                        expected: "json".to_string(),
                        preview: preview(&s),
                    });
                    SqlValue::Null
                }
            },

            (RawValue::Text(s), _) => {
                if s.contains('\0') {
                    self.stats.stripped_nul += 1;
                    SqlValue::Text(s.replace('\0', ""))
                } else {
                    SqlValue::Text(s)
                }
            }

            (RawValue::Integer(v), _) => SqlValue::Integer(v),
            (RawValue::Real(v), _) => SqlValue::Real(v),
            (RawValue::Blob(b), _) => SqlValue::Bytes(b),
        }
    }

    /// Clean every cell of a row against the table's schema.
    pub fn clean_row(
        &mut self,
        row: Vec<RawValue>,
        schema: &TableSchema,
        log: &dyn LogSink,
    ) -> std::result::Result<Vec<SqlValue>, CleaningFault> {
        if row.len() != schema.len() {
            return Err(CleaningFault {
                expected: schema.len(),
                found: row.len(),
            });
        }

        Ok(row
            .into_iter()
            .zip(&schema.columns)
            .map(|(value, col)| self.coerce(value, col.resolved, col.name(), log))
            .collect())
    }

    /// Clean a whole batch. Any faulty row fails the entire batch.
    pub fn clean_batch(
        &mut self,
        rows: Vec<Vec<RawValue>>,
        schema: &TableSchema,
        log: &dyn LogSink,
    ) -> std::result::Result<Vec<Vec<SqlValue>>, CleaningFault> {
        rows.into_iter()
            .map(|row| self.clean_row(row, schema, log))
            .collect()
    }
}

/// Clean a single value without keeping counters.
pub fn coerce(value: RawValue, target: ResolvedType, column: &str, log: &dyn LogSink) -> SqlValue {
    Coercer::new().coerce(value, target, column, log)
}
