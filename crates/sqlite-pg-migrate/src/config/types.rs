//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drivers::common::SslMode;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,

    /// Try to open the file read-only first (default: true).
    #[serde(default = "default_true")]
    pub read_only: bool,

    /// Page cache size in KiB (default: 40000).
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i64,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: true,
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name (default: "postgres").
    #[serde(default = "default_postgres")]
    pub database: String,

    /// Username (default: "postgres").
    #[serde(default = "default_postgres")]
    pub user: String,

    /// Password. Never written back out; falls back to `PGPASSWORD`.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Connection establishment timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_pg_port(),
            database: default_postgres(),
            user: default_postgres(),
            password: String::new(),
            schema: default_public_schema(),
            ssl_mode: SslMode::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Create destination tables that do not exist yet (default: true).
    #[serde(default = "default_true")]
    pub create_missing_tables: bool,

    /// Run SQLite integrity checks before migrating (default: true).
    #[serde(default = "default_true")]
    pub integrity_check: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            create_missing_tables: true,
            integrity_check: true,
        }
    }
}

/// Batch sizes above this only produce a warning.
pub const LARGE_BATCH_SIZE: usize = 10_000;

fn default_true() -> bool {
    true
}

fn default_cache_size_kib() -> i64 {
    40_000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    500
}
