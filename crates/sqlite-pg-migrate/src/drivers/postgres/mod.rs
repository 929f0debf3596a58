//! PostgreSQL driver.
//!
//! - [`PostgresWriter`]: target writer for PostgreSQL databases
//! - [`EncodeError`]: raised when a cleaned value cannot be bound to a
//!   column's server-side type

mod encode;
mod writer;

pub use encode::EncodeError;
pub use writer::{
    build_insert, create_table_ddl, describe_connect_error, rows_per_statement, PostgresWriter,
    MAX_BIND_PARAMS,
};
