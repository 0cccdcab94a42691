use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short-form video. Reels carry storage coordinates but no processing status.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
pub struct ReelItem {
    pub id: String,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub s3_thumb_key: Option<String>,
    pub etag: Option<String>,
    pub checksum_sha256: Option<String>,
    pub file_size_bytes: Option<i64>,
}

impl ReelItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            s3_bucket: None,
            s3_key: None,
            s3_thumb_key: None,
            etag: None,
            checksum_sha256: None,
            file_size_bytes: None,
        }
    }
}
