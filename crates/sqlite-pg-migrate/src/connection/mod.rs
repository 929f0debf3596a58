//! Acquisition and release of the source and destination handles.
//!
//! The two handles are opened as a pair: source first, destination second.
//! A destination failure closes the already-open source before the error is
//! returned. Dropping a [`ConnectionPair`] also terminates both connections,
//! so an early return or a cancelled future never leaks a handle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{SourceConfig, TargetConfig};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::postgres::PostgresWriter;
use crate::drivers::sqlite::SqliteReader;
use crate::error::Result;

/// Open source and destination handles.
pub struct ConnectionPair {
    pub source: Arc<SqliteReader>,
    pub target: Arc<PostgresWriter>,
}

impl ConnectionPair {
    /// Open the source, then the destination.
    pub async fn acquire(source: &SourceConfig, target: &TargetConfig) -> Result<Self> {
        let reader = SqliteReader::open(source).await?;
        if !reader.is_read_only() {
            warn!(
                "Source {} is open read-write; the migration still only reads from it",
                reader.path().display()
            );
        }

        let writer = match PostgresWriter::connect(target).await {
            Ok(writer) => writer,
            Err(e) => {
                reader.close().await;
                return Err(e);
            }
        };

        info!(
            "Connection pair ready: {} -> {}",
            reader.path().display(),
            target.endpoint()
        );

        Ok(Self {
            source: Arc::new(reader),
            target: Arc::new(writer),
        })
    }

    /// Release both handles.
    pub async fn close(self) {
        self.target.close().await;
        self.source.close().await;
        info!("Connections closed");
    }
}
