//! SQLite source reader implementation.
//!
//! Implements the `SourceReader` trait over a SQLx SQLite pool. Cells are
//! read by their runtime storage class rather than the declared column type,
//! since SQLite lets any column hold any class.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::quote_sqlite_ident;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, RawValue};
use crate::error::{MigrateError, Result, Side};

/// Busy timeout for the source file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// The reader task holds one connection while streaming; the second serves
/// metadata queries for the next table.
const MAX_CONNECTIONS: u32 = 2;

/// SQLite source reader.
pub struct SqliteReader {
    pool: SqlitePool,
    path: PathBuf,
    read_only: bool,
}

impl SqliteReader {
    /// Open the source database described by `config`.
    ///
    /// Tries a read-only open first (when configured) and falls back to a
    /// normal open if that fails. Never creates a missing file.
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        let path = config.path.as_path();
        if !path.exists() {
            return Err(MigrateError::connection(
                Side::Source,
                format!("SQLite database not found: {}", path.display()),
            ));
        }

        let cache_size_kib = config.cache_size_kib;
        let (pool, read_only) = if config.read_only {
            match Self::connect(path, true, cache_size_kib).await {
                Ok(pool) => (pool, true),
                Err(e) => {
                    warn!(
                        "Read-only open of {} failed ({}); opening read-write. \
                         The source file will not be modified, but this is no longer enforced",
                        path.display(),
                        e
                    );
                    (Self::open_read_write(path, cache_size_kib).await?, false)
                }
            }
        } else {
            (Self::open_read_write(path, cache_size_kib).await?, false)
        };

        let reader = Self {
            pool,
            path: path.to_path_buf(),
            read_only,
        };
        info!(
            "Opened SQLite source: {} ({})",
            path.display(),
            if read_only { "read-only" } else { "read-write" }
        );

        Ok(reader)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool, path: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            pool,
            path: path.into(),
            read_only,
        }
    }

    async fn open_read_write(path: &Path, cache_size_kib: i64) -> Result<SqlitePool> {
        Self::connect(path, false, cache_size_kib).await.map_err(|e| {
            let mut message = format!("opening {}: {}", path.display(), e);
            if e.to_string().to_lowercase().contains("disk i/o error") {
                message.push_str(" (check file locks, permissions and free disk space)");
            }
            MigrateError::connection(Side::Source, message)
        })
    }

    async fn connect(
        path: &Path,
        read_only: bool,
        cache_size_kib: i64,
    ) -> std::result::Result<SqlitePool, sqlx::Error> {
        // Applied to every pooled connection. Negative values are KiB.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(read_only)
            .create_if_missing(false)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("cache_size", format!("-{}", cache_size_kib.unsigned_abs()));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        // Opening is lazy about the file header; force a read.
        sqlx::query("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await?;

        Ok(pool)
    }

    /// Path of the source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_values(row: &SqliteRow) -> std::result::Result<Vec<RawValue>, sqlx::Error> {
        (0..row.len()).map(|i| Self::cell(row, i)).collect()
    }

    fn cell(row: &SqliteRow, i: usize) -> std::result::Result<RawValue, sqlx::Error> {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(RawValue::Null);
        }
        let class = raw.type_info().name().to_string();

        let value = match class.as_str() {
            "REAL" => RawValue::Real(row.try_get_unchecked::<f64, _>(i)?),
            "TEXT" => RawValue::Text(row.try_get_unchecked::<String, _>(i)?),
            "BLOB" => RawValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
            _ => RawValue::Integer(row.try_get_unchecked::<i64, _>(i)?),
        };
        Ok(value)
    }

    async fn read_table_impl(
        pool: SqlitePool,
        opts: ReadOptions,
        tx: mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let batch_size = opts.batch_size.max(1);
        let col_list = opts
            .columns
            .iter()
            .map(|c| quote_sqlite_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {}",
            col_list,
            quote_sqlite_ident(&opts.table)
        );
        debug!("{}: {}", opts.table, sql);

        let mut rows = sqlx::query(&sql).fetch(&pool);
        let mut buf = Vec::with_capacity(batch_size);
        let mut offset: i64 = 0;

        while let Some(row) = rows.try_next().await? {
            buf.push(Self::row_to_values(&row)?);

            if buf.len() >= batch_size {
                let full = std::mem::replace(&mut buf, Vec::with_capacity(batch_size));
                let batch = Batch::new(full, offset);
                offset += batch.len() as i64;
                if tx.send(Ok(batch)).await.is_err() {
                    debug!("{}: reader stopped, receiver dropped", opts.table);
                    return Ok(());
                }
            }
        }

        if !buf.is_empty() {
            let _ = tx.send(Ok(Batch::new(buf, offset))).await;
        }

        Ok(())
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(MigrateError::from))
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let sql = format!("PRAGMA table_info({})", quote_sqlite_ident(table));
        let rows: Vec<SqliteRow> = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        rows.iter()
            .map(|r| {
                let name: String = r.try_get("name")?;
                let source_type: Option<String> = r.try_get("type")?;
                let cid: i64 = r.try_get("cid")?;
                Ok(ColumnDescriptor::new(
                    name,
                    source_type.unwrap_or_default(),
                    cid as i32,
                ))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| MigrateError::introspection(table, e.to_string()))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_sqlite_ident(table));
        let row: SqliteRow = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        row.try_get::<i64, _>(0)
            .map_err(|e| MigrateError::introspection(table, e.to_string()))
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        // One batch in flight while the previous one is written.
        let (tx, rx) = mpsc::channel(1);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let result = Self::read_table_impl(pool, opts, tx.clone()).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
