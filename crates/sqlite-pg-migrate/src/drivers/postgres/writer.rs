//! PostgreSQL target writer implementation.
//!
//! Implements the `TargetWriter` trait over a single tokio-postgres client.
//! Every mutation runs inside an explicit transaction; rows are written with
//! multi-row parameterized INSERT statements.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_pg_ident};
use crate::core::schema::SchemaColumn;
use crate::core::traits::TargetWriter;
use crate::core::value::SqlValue;
use crate::drivers::common::make_tls_connector;
use crate::error::{MigrateError, Result, Side, WriteError};

/// Bind parameters allowed in one statement by the wire protocol.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL target writer.
pub struct PostgresWriter {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresWriter {
    /// Connect to the target described by `config`.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        if !config.password.is_empty() {
            pg_config.password(&config.password);
        }
        pg_config.application_name("sqlite-pg-migrate");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        let connect_err = |e: tokio_postgres::Error| {
            MigrateError::connection(Side::Target, describe_connect_error(&e, config))
        };

        let (client, connection) = match make_tls_connector(config.ssl_mode)? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, conn) = pg_config.connect(NoTls).await.map_err(connect_err)?;
                (client, spawn_connection(conn))
            }
            Some(tls) => {
                let (client, conn) = pg_config.connect(tls).await.map_err(connect_err)?;
                (client, spawn_connection(conn))
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(Side::Target, e.to_string()))?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { client, connection })
    }

    /// Run one statement in its own transaction.
    async fn execute_in_transaction(&self, sql: &str) -> Result<()> {
        self.begin().await?;
        if let Err(e) = self.client.batch_execute(sql).await {
            let _ = self.rollback().await;
            return Err(map_write_error(e));
        }
        self.commit().await
    }

    /// Server version string, e.g. "16.2".
    pub async fn server_version(&self) -> Result<String> {
        let row = self.client.query_one("SHOW server_version", &[]).await?;
        Ok(row.get::<_, String>(0))
    }
}

fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed: {}", e);
        }
    })
}

/// Generate `CREATE TABLE IF NOT EXISTS` DDL from a mapped schema.
pub fn create_table_ddl(schema: &str, table: &str, columns: &[SchemaColumn]) -> String {
    let col_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_pg_ident(c.name()), c.mapped.pg_type()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        qualify_pg(schema, table),
        col_defs.join(",\n    ")
    )
}

/// Build a positional INSERT for `rows` rows of `cols`.
pub fn build_insert(schema: &str, table: &str, cols: &[String], rows: usize) -> String {
    let col_list = cols
        .iter()
        .map(|c| quote_pg_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualify_pg(schema, table),
        col_list
    );

    let mut param = 1;
    for r in 0..rows {
        if r > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for c in 0..cols.len() {
            if c > 0 {
                sql.push_str(", ");
            }
            sql.push('$');
            sql.push_str(&param.to_string());
            param += 1;
        }
        sql.push(')');
    }
    sql
}

/// Rows per INSERT statement that stay under the bind parameter limit.
///
/// `None` when even a single row has more columns than the limit allows.
pub fn rows_per_statement(num_cols: usize) -> Option<usize> {
    match MAX_BIND_PARAMS / num_cols.max(1) {
        0 => None,
        rows => Some(rows),
    }
}

/// Like [`rows_per_statement`], failing the table when no row fits.
fn statement_rows(table: &str, num_cols: usize) -> Result<usize> {
    rows_per_statement(num_cols).ok_or_else(|| {
        MigrateError::transfer(
            table,
            format!(
                "{} columns exceed the {} bind parameter limit of a single INSERT",
                num_cols, MAX_BIND_PARAMS
            ),
        )
    })
}

fn is_connection_lost(e: &tokio_postgres::Error) -> bool {
    if e.is_closed() {
        return true;
    }
    if let Some(db) = e.as_db_error() {
        let code = db.code();
        return code.code().starts_with("08")
            || *code == SqlState::ADMIN_SHUTDOWN
            || *code == SqlState::CRASH_SHUTDOWN
            || *code == SqlState::CANNOT_CONNECT_NOW;
    }
    let mut source = e.source();
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// Convert a driver error from a data write into a [`MigrateError::Write`].
pub(crate) fn map_write_error(e: tokio_postgres::Error) -> MigrateError {
    if is_connection_lost(&e) {
        return WriteError::connection_lost(e.to_string()).into();
    }

    match e.as_db_error() {
        Some(db) => WriteError {
            code: Some(db.code().code().to_string()),
            message: db.message().to_string(),
            detail: db.detail().map(str::to_string),
            hint: db.hint().map(str::to_string),
            column: db.column().map(str::to_string),
            constraint: db.constraint().map(str::to_string),
            connection_lost: false,
        }
        .into(),
        None => {
            let message = match e.source() {
                Some(source) => format!("{}: {}", e, source),
                None => e.to_string(),
            };
            WriteError::rejected(message).into()
        }
    }
}

/// Turn a connection failure into an actionable message.
pub fn describe_connect_error(e: &tokio_postgres::Error, config: &TargetConfig) -> String {
    if let Some(db) = e.as_db_error() {
        let code = db.code();
        if *code == SqlState::INVALID_PASSWORD {
            return format!(
                "authentication failed for user '{}': check the password (or PGPASSWORD)",
                config.user
            );
        }
        if *code == SqlState::INVALID_CATALOG_NAME {
            return format!(
                "database '{}' does not exist on {}:{}",
                config.database, config.host, config.port
            );
        }
        if *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION {
            if db.message().contains("role") {
                return format!("role '{}' does not exist", config.user);
            }
            return format!("connection rejected: {}", db.message());
        }
        return format!("[{}] {}", code.code(), db.message());
    }

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionRefused => format!(
                    "connection refused at {}:{}: is PostgreSQL running and accepting TCP connections?",
                    config.host, config.port
                ),
                std::io::ErrorKind::TimedOut => format!(
                    "timed out connecting to {}:{} after {}s",
                    config.host, config.port, config.connect_timeout_secs
                ),
                _ => format!("cannot reach {}:{}: {}", config.host, config.port, io),
            };
        }
        source = err.source();
    }

    let text = e.to_string();
    if text.contains("timeout") || text.contains("timed out") {
        return format!(
            "timed out connecting to {}:{} after {}s",
            config.host, config.port, config.connect_timeout_secs
        );
    }
    text
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;

        let row = self.client.query_one(sql, &[&schema, &table]).await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn column_types(&self, schema: &str, table: &str) -> Result<HashMap<String, String>> {
        let sql = r#"
            SELECT lower(column_name), lower(data_type)
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
        "#;

        let rows = self.client.query(sql, &[&schema, &table]).await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect())
    }

    async fn create_table(
        &self,
        schema: &str,
        table: &str,
        columns: &[SchemaColumn],
    ) -> Result<()> {
        let ddl = create_table_ddl(schema, table, columns);
        debug!("{}", ddl);
        self.execute_in_transaction(&ddl).await?;
        info!("Created table {}.{}", schema, table);
        Ok(())
    }

    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        let sql = format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            qualify_pg(schema, table)
        );
        debug!("{}", sql);
        self.execute_in_transaction(&sql).await
    }

    async fn begin(&self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(map_write_error)
    }

    async fn commit(&self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(map_write_error)
    }

    async fn rollback(&self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(map_write_error)
    }

    async fn insert_batch(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if cols.is_empty() || rows.is_empty() {
            return Ok(0);
        }

        let mut written = 0u64;
        let per_statement = statement_rows(table, cols.len())?;
        for chunk in rows.chunks(per_statement) {
            let sql = build_insert(schema, table, cols, chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();

            written += self
                .client
                .execute(sql.as_str(), &params)
                .await
                .map_err(map_write_error)?;
        }

        Ok(written)
    }

    async fn insert_row(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        row: &[SqlValue],
    ) -> Result<()> {
        statement_rows(table, cols.len())?;
        let sql = build_insert(schema, table, cols, 1);
        let params: Vec<&(dyn ToSql + Sync)> =
            row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        self.client
            .execute(sql.as_str(), &params)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.connection.abort();
    }
}
