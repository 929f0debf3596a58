//! Cell value types for source rows and cleaned destination rows.
//!
//! [`RawValue`] mirrors the five SQLite storage classes exactly as they were
//! read. [`SqlValue`] is what the value coercer produces and what the
//! destination writer binds as a statement parameter.

use std::fmt;

/// Number of characters kept when a value is shown in a diagnostic.
pub const PREVIEW_CHARS: usize = 50;

/// A cell as read from SQLite, keyed by its runtime storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("NULL"),
            RawValue::Integer(v) => write!(f, "{}", v),
            RawValue::Real(v) => write!(f, "{}", v),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Real(v)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(b: Vec<u8>) -> Self {
        RawValue::Blob(b)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(RawValue::Null, Into::into)
    }
}

/// A cleaned cell, ready to be bound against a destination column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short rendering for row failure diagnostics.
    pub fn preview(&self) -> String {
        preview(&self.to_string())
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Truncate `s` to [`PREVIEW_CHARS`] characters, marking the cut with `...`.
pub fn preview(s: &str) -> String {
    let mut chars = s.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// A batch of raw rows read from one table.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Rows in source column order.
    pub rows: Vec<Vec<RawValue>>,

    /// Zero-based position of the first row within the table.
    pub offset: i64,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Vec<RawValue>>, offset: i64) -> Self {
        Self { rows, offset }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_value_untouched() {
        assert_eq!(preview("hello"), "hello");
        assert_eq!(preview(&"x".repeat(50)), "x".repeat(50));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 53);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_sql_value_preview() {
        assert_eq!(SqlValue::Null.preview(), "NULL");
        assert_eq!(SqlValue::Bytes(vec![1, 2, 3]).preview(), "<3 bytes>");
        assert_eq!(
            SqlValue::Json(serde_json::json!({"a": 1})).preview(),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_raw_value_from_option() {
        let none: Option<i64> = None;
        assert!(RawValue::from(none).is_null());
        assert_eq!(RawValue::from(Some("x")), RawValue::Text("x".into()));
    }

    #[test]
    fn test_batch_operations() {
        let batch = Batch::new(vec![vec![RawValue::Integer(1)]], 500);
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
        assert_eq!(batch.offset, 500);
        assert!(Batch::default().is_empty());
    }
}
