//! Pre-flight integrity checks of the SQLite source file.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, warn};

use super::SqliteReader;

/// Result of one integrity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub name: String,
    pub passed: bool,
    /// `ok`, or what the probe reported.
    pub detail: String,
}

/// Results of all integrity probes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checks: Vec<IntegrityCheck>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Names of the failed checks.
    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(
                f,
                "{:>18}: {} ({})",
                check.name,
                if check.passed { "passed" } else { "FAILED" },
                check.detail
            )?;
        }
        Ok(())
    }
}

/// Rows shown in a failed check's detail.
const MAX_DETAIL_ROWS: usize = 5;

fn describe_rows(rows: &[SqliteRow]) -> String {
    let mut parts: Vec<String> = rows
        .iter()
        .take(MAX_DETAIL_ROWS)
        .map(|row| {
            (0..row.len())
                .map(|i| match row.try_get_unchecked::<Option<String>, _>(i) {
                    Ok(Some(s)) => s,
                    Ok(None) => "NULL".to_string(),
                    Err(_) => "?".to_string(),
                })
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect();
    if rows.len() > MAX_DETAIL_ROWS {
        parts.push(format!("... {} more", rows.len() - MAX_DETAIL_ROWS));
    }
    parts.join("; ")
}

impl SqliteReader {
    /// Run `PRAGMA integrity_check`, `PRAGMA foreign_key_check` and a
    /// `sqlite_master` probe.
    ///
    /// Never fails: a probe that errors is reported as a failed check.
    pub async fn integrity_check(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for (name, sql) in [
            ("integrity_check", "PRAGMA integrity_check"),
            ("foreign_key_check", "PRAGMA foreign_key_check"),
        ] {
            info!("Running SQLite {}", name);
            let check = match sqlx::query(sql).fetch_all(self.pool()).await {
                Ok(rows) => {
                    let ok = rows.is_empty()
                        || (rows.len() == 1
                            && matches!(
                                rows[0].try_get_unchecked::<String, _>(0).as_deref(),
                                Ok("ok")
                            ));
                    IntegrityCheck {
                        name: name.to_string(),
                        passed: ok,
                        detail: if ok {
                            "ok".to_string()
                        } else {
                            describe_rows(&rows)
                        },
                    }
                }
                Err(e) => IntegrityCheck {
                    name: name.to_string(),
                    passed: false,
                    detail: format!("error: {}", e),
                },
            };
            if !check.passed {
                warn!("SQLite {} failed: {}", check.name, check.detail);
            }
            report.checks.push(check);
        }

        let schema = match sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
            .fetch_one(self.pool())
            .await
        {
            Ok(row) => IntegrityCheck {
                name: "schema_query".to_string(),
                passed: true,
                detail: format!("{} tables", row.try_get::<i64, _>(0).unwrap_or(0)),
            },
            Err(e) => IntegrityCheck {
                name: "schema_query".to_string(),
                passed: false,
                detail: format!("cannot query sqlite_master: {}", e),
            },
        };
        report.checks.push(schema);

        report
    }
}
