//! Telemetry and Audit Storage
//!
//! Storage collaborators of the pipeline, each behind a `Send + Sync` trait so
//! backends can be swapped without touching pipeline code:
//! - [`TelemetryStore`]: time-series of incoming readings
//! - [`QuarantineStore`]: interlock audit records
//!
//! Sled backs both in production (one database, one tree per concern); the
//! in-memory implementations serve tests and minimal deployments.

mod quarantine;
mod telemetry;

pub use quarantine::{InMemoryQuarantineStore, QuarantineStore, SledQuarantineStore};
pub use telemetry::{InMemoryTelemetryStore, SledTelemetryStore, TelemetryStore};

use std::path::Path;
use std::sync::Arc;

/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "sentinel.db";

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("transaction aborted: {0}")]
    Transaction(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A record for the same (tool, wafer) pair already exists
    #[error("already quarantined as record {0}")]
    Duplicate(u64),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Open (or create) the sled database under `data_dir`.
pub fn open_db<P: AsRef<Path>>(data_dir: P) -> Result<Arc<sled::Db>, StorageError> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)
        .map_err(|e| StorageError::Database(format!("create {:?}: {}", data_dir, e)))?;
    let path = data_dir.join(DB_FILE_NAME);
    let db = sled::open(&path)?;
    tracing::info!(path = ?path, "Storage opened");
    Ok(Arc::new(db))
}
