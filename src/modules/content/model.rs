use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Pending,
    UploadingS3,
    Published,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::UploadingS3 => "uploading_s3",
            ContentStatus::Published => "published",
            ContentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ContentStatus {
    fn from(s: &str) -> Self {
        match s {
            "uploading_s3" => ContentStatus::UploadingS3,
            "published" => ContentStatus::Published,
            "failed" => ContentStatus::Failed,
            _ => ContentStatus::Pending,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub content_status: String, // Stored as text in DB
    pub failure_reason: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub s3_thumb_key: Option<String>,
    pub etag: Option<String>,
    pub checksum_sha256: Option<String>,
    pub file_size_bytes: Option<i64>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_status: ContentStatus::Pending.to_string(),
            failure_reason: None,
            s3_bucket: None,
            s3_key: None,
            s3_thumb_key: None,
            etag: None,
            checksum_sha256: None,
            file_size_bytes: None,
        }
    }

    pub fn status(&self) -> ContentStatus {
        ContentStatus::from(self.content_status.as_str())
    }
}
