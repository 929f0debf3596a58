//! SQLite source driver.
//!
//! - [`SqliteReader`]: source database reader (SQLx)
//! - [`IntegrityReport`]: pre-flight checks of the source file

mod integrity;
mod reader;

pub use integrity::{IntegrityCheck, IntegrityReport};
pub use reader::SqliteReader;
