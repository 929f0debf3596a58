//! Binding cleaned values as PostgreSQL statement parameters.
//!
//! Parameter types are inferred by the server from the destination columns,
//! so a value is encoded against whatever type the column has. A SQLite
//! INTEGER may land in an `int4`, `numeric` or `text` column; the conversions
//! here follow PostgreSQL's assignment casts (and its input parsing for text),
//! and anything PostgreSQL would reject fails the row with an [`EncodeError`].

use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, Json, ToSql, Type};
use uuid::Uuid;

use crate::core::value::{preview, SqlValue};

type BoxError = Box<dyn Error + Sync + Send>;

/// A cleaned value cannot be stored in its destination column.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot store {kind} value '{value}' in a column of type {pg_type}")]
    Incompatible {
        kind: &'static str,
        value: String,
        pg_type: String,
    },

    #[error("value {value} is out of range for type {pg_type}")]
    OutOfRange { value: String, pg_type: String },
}

fn kind(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "null",
        SqlValue::Bool(_) => "boolean",
        SqlValue::Integer(_) => "integer",
        SqlValue::Real(_) => "real",
        SqlValue::Text(_) => "text",
        SqlValue::Bytes(_) => "blob",
        SqlValue::Json(_) => "json",
    }
}

fn incompatible(value: &SqlValue, ty: &Type) -> BoxError {
    Box::new(EncodeError::Incompatible {
        kind: kind(value),
        value: value.preview(),
        pg_type: ty.name().to_string(),
    })
}

fn out_of_range(value: impl ToString, ty: &Type) -> BoxError {
    Box::new(EncodeError::OutOfRange {
        value: preview(&value.to_string()),
        pg_type: ty.name().to_string(),
    })
}

/// Integer value for an integer column, rounding reals like PostgreSQL does.
fn as_i64(value: &SqlValue, ty: &Type) -> Result<i64, BoxError> {
    match value {
        SqlValue::Integer(v) => Ok(*v),
        SqlValue::Real(f) => {
            let r = f.round();
            if r.is_finite() && r >= i64::MIN as f64 && r <= i64::MAX as f64 {
                Ok(r as i64)
            } else {
                Err(out_of_range(f, ty))
            }
        }
        SqlValue::Text(s) => s.trim().parse::<i64>().map_err(|_| incompatible(value, ty)),
        _ => Err(incompatible(value, ty)),
    }
}

fn as_f64(value: &SqlValue, ty: &Type) -> Result<f64, BoxError> {
    match value {
        SqlValue::Integer(v) => Ok(*v as f64),
        SqlValue::Real(f) => Ok(*f),
        SqlValue::Text(s) => s.trim().parse::<f64>().map_err(|_| incompatible(value, ty)),
        _ => Err(incompatible(value, ty)),
    }
}

fn as_decimal(value: &SqlValue, ty: &Type) -> Result<Decimal, BoxError> {
    match value {
        SqlValue::Integer(v) => Ok(Decimal::from(*v)),
        SqlValue::Real(f) => Decimal::try_from(*f).map_err(|_| out_of_range(f, ty)),
        SqlValue::Text(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| incompatible(value, ty))
        }
        _ => Err(incompatible(value, ty)),
    }
}

fn as_bool(value: &SqlValue, ty: &Type) -> Result<bool, BoxError> {
    match value {
        SqlValue::Bool(b) => Ok(*b),
        SqlValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
            _ => Err(incompatible(value, ty)),
        },
        _ => Err(incompatible(value, ty)),
    }
}

/// Text rendering used for string columns.
fn as_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Bytes(b) => {
            let mut s = String::with_capacity(2 + b.len() * 2);
            s.push_str("\\x");
            for byte in b {
                s.push_str(&format!("{:02x}", byte));
            }
            s
        }
        other => other.to_string(),
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|dt| dt.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn text_of<'a>(value: &'a SqlValue, ty: &Type) -> Result<&'a str, BoxError> {
    match value {
        SqlValue::Text(s) => Ok(s),
        _ => Err(incompatible(value, ty)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::INT2 => {
                let v = as_i64(self, ty)?;
                i16::try_from(v)
                    .map_err(|_| out_of_range(v, ty))?
                    .to_sql(ty, out)
            }
            Type::INT4 => {
                let v = as_i64(self, ty)?;
                i32::try_from(v)
                    .map_err(|_| out_of_range(v, ty))?
                    .to_sql(ty, out)
            }
            Type::INT8 => as_i64(self, ty)?.to_sql(ty, out),
            Type::FLOAT4 => (as_f64(self, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => as_f64(self, ty)?.to_sql(ty, out),
            Type::NUMERIC => as_decimal(self, ty)?.to_sql(ty, out),
            Type::BOOL => as_bool(self, ty)?.to_sql(ty, out),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                match self {
                    SqlValue::Text(s) => s.as_str().to_sql(ty, out),
                    other => as_text(other).to_sql(ty, out),
                }
            }
            Type::JSON | Type::JSONB => match self {
                SqlValue::Json(v) => Json(v).to_sql(ty, out),
                SqlValue::Text(s) => {
                    let parsed: serde_json::Value =
                        serde_json::from_str(s).map_err(|_| incompatible(self, ty))?;
                    Json(parsed).to_sql(ty, out)
                }
                _ => Err(incompatible(self, ty)),
            },
            Type::BYTEA => match self {
                SqlValue::Bytes(b) => b.as_slice().to_sql(ty, out),
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                _ => Err(incompatible(self, ty)),
            },
            Type::DATE => parse_date(text_of(self, ty)?)
                .ok_or_else(|| incompatible(self, ty))?
                .to_sql(ty, out),
            Type::TIME => parse_time(text_of(self, ty)?)
                .ok_or_else(|| incompatible(self, ty))?
                .to_sql(ty, out),
            Type::TIMESTAMP => parse_timestamp(text_of(self, ty)?)
                .ok_or_else(|| incompatible(self, ty))?
                .to_sql(ty, out),
            Type::TIMESTAMPTZ => parse_timestamptz(text_of(self, ty)?)
                .ok_or_else(|| incompatible(self, ty))?
                .to_sql(ty, out),
            Type::UUID => {
                let uuid = match self {
                    SqlValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
                    SqlValue::Bytes(b) => Uuid::from_slice(b).ok(),
                    _ => None,
                };
                uuid.ok_or_else(|| incompatible(self, ty))?.to_sql(ty, out)
            }
            _ => Err(incompatible(self, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: SqlValue, ty: Type) -> Result<Option<Vec<u8>>, BoxError> {
        let mut buf = BytesMut::new();
        match value.to_sql(&ty, &mut buf)? {
            IsNull::Yes => Ok(None),
            IsNull::No => Ok(Some(buf.to_vec())),
        }
    }

    #[test]
    fn test_null_encodes_as_null_for_any_type() {
        assert!(encode(SqlValue::Null, Type::INT4).unwrap().is_none());
        assert!(encode(SqlValue::Null, Type::JSONB).unwrap().is_none());
    }

    #[test]
    fn test_integer_narrows_to_column_width() {
        assert_eq!(
            encode(SqlValue::Integer(7), Type::INT4).unwrap(),
            Some(7i32.to_be_bytes().to_vec())
        );
        assert_eq!(
            encode(SqlValue::Integer(7), Type::INT2).unwrap(),
            Some(7i16.to_be_bytes().to_vec())
        );
        let err = encode(SqlValue::Integer(1 << 40), Type::INT4).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_numeric_text_is_parsed_for_integer_columns() {
        assert_eq!(
            encode(SqlValue::Text(" 42 ".into()), Type::INT8).unwrap(),
            Some(42i64.to_be_bytes().to_vec())
        );
        assert!(encode(SqlValue::Text("forty".into()), Type::INT8).is_err());
    }

    #[test]
    fn test_integer_into_text_column_is_rendered() {
        assert_eq!(
            encode(SqlValue::Integer(12), Type::TEXT).unwrap(),
            Some(b"12".to_vec())
        );
    }

    #[test]
    fn test_bool_column_rejects_integer() {
        assert!(encode(SqlValue::Integer(1), Type::BOOL).is_err());
        assert_eq!(
            encode(SqlValue::Bool(true), Type::BOOL).unwrap(),
            Some(vec![1])
        );
        assert_eq!(
            encode(SqlValue::Text("f".into()), Type::BOOL).unwrap(),
            Some(vec![0])
        );
    }

    #[test]
    fn test_json_into_jsonb() {
        let bytes = encode(SqlValue::Json(serde_json::json!({"a": 1})), Type::JSONB)
            .unwrap()
            .unwrap();
        // jsonb binary format starts with a version byte.
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], b"{\"a\":1}");
    }

    #[test]
    fn test_timestamp_text_formats() {
        for s in [
            "2024-01-02 03:04:05",
            "2024-01-02T03:04:05.123",
            "2024-01-02",
            "2024-01-02T03:04:05Z",
        ] {
            assert!(parse_timestamp(s).is_some(), "{}", s);
        }
        assert!(parse_timestamp("yesterday").is_none());
        assert!(encode(SqlValue::Text("2024-01-02".into()), Type::TIMESTAMP)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_date_and_time_text() {
        assert_eq!(
            parse_date("2024-03-01 10:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_time("10:30"), NaiveTime::from_hms_opt(10, 30, 0));
        assert!(encode(SqlValue::Integer(5), Type::DATE).is_err());
    }

    #[test]
    fn test_bytes_into_text_use_hex_escape() {
        assert_eq!(as_text(&SqlValue::Bytes(vec![0xde, 0xad])), "\\xdead");
    }

    #[test]
    fn test_unsupported_type_fails() {
        let err = encode(SqlValue::Text("x".into()), Type::INET).unwrap_err();
        assert!(err.to_string().contains("inet"));
    }
}
