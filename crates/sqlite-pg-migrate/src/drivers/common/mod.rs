//! Utilities shared by the drivers.
//!
//! - [`tls`]: TLS configuration for the PostgreSQL connection

pub mod tls;

pub use tls::{make_tls_connector, SslMode};
