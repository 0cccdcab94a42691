use crate::infrastructure::queue::QueueError;
use crate::infrastructure::storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while moving one staged media file into object storage.
///
/// Every variant is retried by the queue; none is special-cased.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("record {0} not found in content or reels")]
    NotFound(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage upload failed: {0}")]
    StorageUpload(#[from] StorageError),

    #[error("upload of {key} aborted after {timeout_ms}ms timeout")]
    Timeout { key: String, timeout_ms: u128 },

    #[error("record update failed for {record_id}: {source}")]
    RecordUpdate {
        record_id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("record lookup failed for {record_id}: {source}")]
    Database {
        record_id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("record {0} is being processed by another attempt")]
    RecordBusy(String),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("record lease unavailable: {0}")]
    Lease(#[from] QueueError),
}

impl UploadError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        UploadError::Io {
            path: path.into(),
            source,
        }
    }
}
