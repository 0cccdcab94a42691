//! Direct attachment uploads used outside the queue (chat and club attachments).
//!
//! Unlike the worker path these run while a caller waits, so they carry a hard wall-clock
//! budget and always delete the staged file.

use crate::common::cleanup::remove_staged;
use crate::common::keys::attachment_key;
use crate::common::upload::FileUploader;
use crate::error::UploadError;
use crate::infrastructure::storage::ObjectMeta;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, instrument};

pub const DEFAULT_FOLDER: &str = "attachments";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone)]
pub struct StagedAttachment {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
}

/// Uploads `attachment` under `clubs/{folder}/` and returns its public URL.
#[instrument(skip(uploader, attachment), fields(filename = %attachment.filename))]
pub async fn upload_attachment(
    uploader: &FileUploader,
    attachment: StagedAttachment,
    folder: &str,
    timeout: Duration,
) -> Result<String, UploadError> {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let key = attachment_key(folder, millis, &attachment.filename);
    let meta = ObjectMeta::new(attachment.content_type.clone());

    let result = uploader
        .upload_within(&attachment.path, &key, &meta, timeout)
        .await;

    let _ = remove_staged(&attachment.path).await;

    let uploaded = result?;
    info!(key = %uploaded.key, size_bytes = uploaded.size_bytes, "Attachment uploaded");
    Ok(uploader.store().public_url(&uploaded.key))
}
