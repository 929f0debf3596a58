//! Type mapping between SQLite and PostgreSQL.
//!
//! SQLite accepts any text as a declared column type and only derives an
//! affinity from it, so mapping works on keywords contained in the declared
//! type rather than on exact names.

use crate::core::ColumnType;

/// Result of mapping a declared source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Destination column type.
    pub column_type: ColumnType,
    /// Warning for types that were not recognized.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a recognized type mapping.
    pub fn exact(column_type: ColumnType) -> Self {
        Self {
            column_type,
            warning: None,
        }
    }

    /// Create a fallback mapping with a warning.
    pub fn fallback(column_type: ColumnType, warning: impl Into<String>) -> Self {
        Self {
            column_type,
            warning: Some(warning.into()),
        }
    }
}

/// Map a declared SQLite column type to a PostgreSQL column type.
///
/// Never fails: unrecognized types map to `TEXT` with a warning.
pub fn sqlite_to_postgres(source_type: &str) -> TypeMapping {
    let t = source_type.trim().to_uppercase();

    // No declared type: SQLite stores whatever it is given.
    if t.is_empty() {
        return TypeMapping::exact(ColumnType::Text);
    }

    // JSON columns are created as text; values are handled by the coercer.
    if t == "JSON" {
        return TypeMapping::exact(ColumnType::Text);
    }

    let column_type = if t.contains("INT") {
        if t.contains("BIGINT") {
            ColumnType::BigInt
        } else {
            ColumnType::Integer
        }
    } else if t.contains("CHAR") || t.contains("TEXT") || t.contains("CLOB") {
        ColumnType::Text
    } else if t.contains("BLOB") {
        ColumnType::Bytes
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        ColumnType::Double
    } else if t.contains("NUMERIC") || t.contains("DECIMAL") {
        ColumnType::Numeric
    } else if t.contains("BOOL") {
        ColumnType::Boolean
    } else if t.contains("DATE") || t.contains("TIME") {
        let has_date = t.contains("DATE");
        let has_time = t.contains("TIME");
        if t.contains("TIMESTAMP") || (has_date && has_time) {
            ColumnType::Timestamp
        } else if has_date {
            ColumnType::Date
        } else {
            ColumnType::Time
        }
    } else {
        return TypeMapping::fallback(
            ColumnType::Text,
            format!("Unknown SQLite type '{}', mapping to TEXT", source_type),
        );
    };

    TypeMapping::exact(column_type)
}
