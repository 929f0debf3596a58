//! Database driver implementations.
//!
//! - [`sqlite`]: source reader over SQLx
//! - [`postgres`]: target writer over tokio-postgres
//! - [`common`]: shared utilities (TLS)

pub mod common;
pub mod postgres;
pub mod sqlite;

pub use common::SslMode;
pub use postgres::PostgresWriter;
pub use sqlite::SqliteReader;
