//! Identifier validation and quoting for generated SQL.
//!
//! Identifiers (table, schema and column names) cannot be bound as statement
//! parameters, so every name that reaches generated SQL passes through one of
//! the quoting functions here.
//!
//! PostgreSQL names are only quoted when they have to be: a plain lower-case
//! name that is not a reserved word is emitted bare, anything else is wrapped
//! in double quotes. Quoting a mixed-case name preserves its case in the
//! destination, where a bare name would be folded to lower case.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted from configuration.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// PostgreSQL keywords that cannot be used as bare identifiers.
const PG_RESERVED: &[&str] = &[
    "all",
    "analyse",
    "analyze",
    "and",
    "any",
    "array",
    "as",
    "asc",
    "asymmetric",
    "authorization",
    "between",
    "binary",
    "both",
    "case",
    "cast",
    "check",
    "collate",
    "column",
    "concurrently",
    "constraint",
    "create",
    "cross",
    "current_catalog",
    "current_date",
    "current_role",
    "current_schema",
    "current_time",
    "current_timestamp",
    "current_user",
    "default",
    "deferrable",
    "desc",
    "distinct",
    "do",
    "else",
    "end",
    "except",
    "false",
    "fetch",
    "for",
    "foreign",
    "freeze",
    "from",
    "full",
    "grant",
    "group",
    "having",
    "ilike",
    "in",
    "initially",
    "inner",
    "intersect",
    "into",
    "is",
    "isnull",
    "join",
    "lateral",
    "leading",
    "left",
    "like",
    "limit",
    "localtime",
    "localtimestamp",
    "natural",
    "not",
    "notnull",
    "null",
    "offset",
    "on",
    "only",
    "or",
    "order",
    "outer",
    "overlaps",
    "placing",
    "primary",
    "references",
    "returning",
    "right",
    "select",
    "session_user",
    "similar",
    "some",
    "symmetric",
    "table",
    "tablesample",
    "then",
    "to",
    "trailing",
    "true",
    "union",
    "unique",
    "user",
    "using",
    "variadic",
    "verbose",
    "when",
    "where",
    "window",
    "with",
];

/// Validate an identifier supplied through configuration.
///
/// Rejects empty names, names containing NUL and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Whether `name` is a PostgreSQL reserved keyword (case-insensitive).
pub fn is_pg_reserved(name: &str) -> bool {
    let lower = name.to_lowercase();
    PG_RESERVED.binary_search(&lower.as_str()).is_ok()
}

/// Render a name safely for interpolation into a PostgreSQL statement.
///
/// Returns the name unchanged when it is a valid bare identifier, not a
/// reserved word and already lower-case. Otherwise it is wrapped in double
/// quotes with embedded double quotes doubled.
///
/// # Examples
///
/// ```
/// use sqlite_pg_migrate::core::identifier::quote_pg_ident;
///
/// assert_eq!(quote_pg_ident("users"), "users");
/// assert_eq!(quote_pg_ident("user"), "\"user\"");
/// assert_eq!(quote_pg_ident("createdAt"), "\"createdAt\"");
/// ```
pub fn quote_pg_ident(name: &str) -> String {
    if is_bare_identifier(name) && !is_pg_reserved(name) && name == name.to_lowercase() {
        return name.to_string();
    }
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_pg_ident(schema), quote_pg_ident(table))
}

/// Quote a SQLite identifier.
///
/// Always quoted; SQLite names are read back exactly as declared.
pub fn quote_sqlite_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_list_is_sorted() {
        let mut sorted = PG_RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, PG_RESERVED);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("public").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_plain_names_stay_bare() {
        assert_eq!(quote_pg_ident("users"), "users");
        assert_eq!(quote_pg_ident("_private"), "_private");
        assert_eq!(quote_pg_ident("col_2"), "col_2");
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        assert_eq!(quote_pg_ident("user"), "\"user\"");
        assert_eq!(quote_pg_ident("order"), "\"order\"");
        assert_eq!(quote_pg_ident("Select"), "\"Select\"");
    }

    #[test]
    fn test_mixed_case_is_quoted() {
        assert_eq!(quote_pg_ident("createdAt"), "\"createdAt\"");
        assert_eq!(quote_pg_ident("Users"), "\"Users\"");
    }

    #[test]
    fn test_invalid_bare_names_are_quoted() {
        assert_eq!(quote_pg_ident("1st"), "\"1st\"");
        assert_eq!(quote_pg_ident("first name"), "\"first name\"");
        assert_eq!(quote_pg_ident(""), "\"\"");
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        assert_eq!(quote_pg_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            quote_pg_ident("Robert\"); DROP TABLE students;--"),
            "\"Robert\"\"); DROP TABLE students;--\""
        );
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(qualify_pg("public", "user"), "public.\"user\"");
    }

    #[test]
    fn test_quote_sqlite_ident() {
        assert_eq!(quote_sqlite_ident("users"), "\"users\"");
        assert_eq!(quote_sqlite_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
