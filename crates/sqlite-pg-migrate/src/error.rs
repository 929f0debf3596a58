//! Error types for the migration library.

use std::fmt;

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database handle could not be opened. Fatal to the whole run.
    #[error("Connection error ({side}): {message}")]
    Connection { side: Side, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A write was rejected by the target, with server diagnostics
    #[error("Write failed: {0}")]
    Write(WriteError),

    /// Reading table metadata failed. Fatal to one table.
    #[error("Introspection failed for table {table}: {message}")]
    Introspection { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// SQLite integrity checks reported problems
    #[error("Source integrity check failed: {0}")]
    Integrity(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

/// Which side of the migration a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

impl MigrateError {
    /// Create a Connection error for the given side.
    pub fn connection(side: Side, message: impl Into<String>) -> Self {
        MigrateError::Connection {
            side,
            message: message.into(),
        }
    }

    /// Create an Introspection error
    pub fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Server diagnostics, if this error came from a rejected write.
    pub fn write_error(&self) -> Option<&WriteError> {
        match self {
            MigrateError::Write(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the failure can be isolated to the data being written.
    ///
    /// Rejected rows trigger row-by-row replay; anything else (a dropped
    /// connection, a source read error) ends the current table.
    pub fn is_data_rejection(&self) -> bool {
        matches!(self, MigrateError::Write(e) if !e.connection_lost)
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connection { .. } => 3,
            MigrateError::Integrity(_) => 4,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// A write rejected by the target database.
///
/// Mirrors the diagnostic fields PostgreSQL attaches to an error response so
/// that a failed row can be located and fixed in the source data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteError {
    /// SQLSTATE code (e.g. `23502` for a NOT NULL violation).
    pub code: Option<String>,
    /// Primary error message.
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// Offending column, when the server reports one.
    pub column: Option<String>,
    /// Offending constraint, when the server reports one.
    pub constraint: Option<String>,
    /// The connection is gone; retrying individual rows is pointless.
    pub connection_lost: bool,
}

impl WriteError {
    /// A rejection carrying only a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// A failure caused by losing the target connection.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            connection_lost: true,
            ..Default::default()
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<WriteError> for MigrateError {
    fn from(e: WriteError) -> Self {
        MigrateError::Write(e)
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_rejection_classification() {
        let rejected = MigrateError::Write(WriteError::rejected("null value"));
        assert!(rejected.is_data_rejection());

        let lost = MigrateError::Write(WriteError::connection_lost("closed"));
        assert!(!lost.is_data_rejection());

        let other = MigrateError::transfer("users", "boom");
        assert!(!other.is_data_rejection());
    }

    #[test]
    fn test_write_error_display_includes_code() {
        let mut err = WriteError::rejected("null value in column \"name\"");
        err.code = Some("23502".to_string());
        assert_eq!(err.to_string(), "[23502] null value in column \"name\"");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            MigrateError::connection(Side::Source, "nope").exit_code(),
            3
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_connection_error_names_side() {
        let err = MigrateError::connection(Side::Target, "refused");
        assert_eq!(err.to_string(), "Connection error (target): refused");
    }
}
