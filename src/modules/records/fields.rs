use crate::modules::content::model::ContentStatus;

/// Sparse set of record fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub content_status: Option<ContentStatus>,
    pub failure_reason: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub s3_thumb_key: Option<String>,
    pub etag: Option<String>,
    pub checksum_sha256: Option<String>,
    pub file_size_bytes: Option<i64>,
}

impl RecordUpdate {
    pub fn status(status: ContentStatus) -> Self {
        Self {
            content_status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            content_status: Some(ContentStatus::Failed),
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// The only fields a reel accepts. Built from a [`RecordUpdate`] by dropping everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReelUpdate {
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub s3_thumb_key: Option<String>,
    pub etag: Option<String>,
    pub checksum_sha256: Option<String>,
    pub file_size_bytes: Option<i64>,
}

impl From<&RecordUpdate> for ReelUpdate {
    fn from(fields: &RecordUpdate) -> Self {
        Self {
            s3_bucket: fields.s3_bucket.clone(),
            s3_key: fields.s3_key.clone(),
            s3_thumb_key: fields.s3_thumb_key.clone(),
            etag: fields.etag.clone(),
            checksum_sha256: fields.checksum_sha256.clone(),
            file_size_bytes: fields.file_size_bytes,
        }
    }
}

impl ReelUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ReelUpdate::default()
    }
}
