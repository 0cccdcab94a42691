use crate::error::UploadError;
use crate::infrastructure::storage::{ObjectMeta, ObjectStore, UploadedPart};
use bytes::Bytes;
use futures_util::{TryStreamExt, stream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, error, info};

pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_QUEUE_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Files larger than this go through a multipart upload, split into parts of this size.
    pub part_size: usize,
    /// Parts in flight at once.
    pub queue_size: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub etag: String,
    pub size_bytes: u64,
}

#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Moves local files into an [`ObjectStore`].
#[derive(Clone)]
pub struct FileUploader {
    store: Arc<dyn ObjectStore>,
    options: UploadOptions,
}

impl FileUploader {
    pub fn new(store: Arc<dyn ObjectStore>, options: UploadOptions) -> Self {
        Self {
            store,
            options: UploadOptions {
                part_size: options.part_size.max(1),
                queue_size: options.queue_size.max(1),
            },
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub async fn upload(
        &self,
        path: &Path,
        key: &str,
        meta: &ObjectMeta,
    ) -> Result<UploadedObject, UploadError> {
        self.upload_until(path, key, meta, None).await
    }

    /// Same as [`FileUploader::upload`] but gives up after `budget`, aborting any multipart
    /// upload already started.
    pub async fn upload_within(
        &self,
        path: &Path,
        key: &str,
        meta: &ObjectMeta,
        budget: Duration,
    ) -> Result<UploadedObject, UploadError> {
        let deadline = Deadline {
            at: Instant::now() + budget,
            budget,
        };
        self.upload_until(path, key, meta, Some(deadline)).await
    }

    async fn upload_until(
        &self,
        path: &Path,
        key: &str,
        meta: &ObjectMeta,
        deadline: Option<Deadline>,
    ) -> Result<UploadedObject, UploadError> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::io(path, e))?
            .len();

        if size_bytes <= self.options.part_size as u64 {
            let body = tokio::fs::read(path)
                .await
                .map_err(|e| UploadError::io(path, e))?;
            let put = async {
                self.store
                    .put_object(key, meta, Bytes::from(body))
                    .await
                    .map_err(UploadError::from)
            };
            let etag = within(deadline, key, put).await?;
            info!(key, size_bytes, "Uploaded object in a single request");
            return Ok(UploadedObject {
                key: key.to_string(),
                etag,
                size_bytes,
            });
        }

        // Not cut short by the deadline: the upload id is needed to abort whatever S3 created.
        let upload_id = self.store.create_multipart_upload(key, meta).await?;
        debug!(key, upload_id = %upload_id, size_bytes, "Started multipart upload");

        let transfer = async {
            let parts = self.send_parts(path, key, &upload_id).await?;
            let part_count = parts.len();
            let etag = self
                .store
                .complete_multipart_upload(key, &upload_id, parts)
                .await?;
            Ok::<_, UploadError>((etag, part_count))
        };

        let outcome = match deadline {
            Some(d) if Instant::now() >= d.at => Err(UploadError::Timeout {
                key: key.to_string(),
                timeout_ms: d.budget.as_millis(),
            }),
            _ => within(deadline, key, transfer).await,
        };

        match outcome {
            Ok((etag, part_count)) => {
                info!(key, size_bytes, part_count, "Completed multipart upload");
                Ok(UploadedObject {
                    key: key.to_string(),
                    etag,
                    size_bytes,
                })
            }
            Err(e) => {
                error!(key, upload_id = %upload_id, error = %e, "Multipart upload failed, aborting");
                if let Err(abort_err) = self.store.abort_multipart_upload(key, &upload_id).await {
                    error!(key, upload_id = %upload_id, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn send_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, UploadError> {
        let file = File::open(path)
            .await
            .map_err(|e| UploadError::io(path, e))?;
        let part_size = self.options.part_size;
        let store = &self.store;

        let chunks = stream::try_unfold((file, 1i32), move |(mut file, part_number)| async move {
            let chunk = read_part(&mut file, part_size).await?;
            let next = (!chunk.is_empty()).then(|| ((part_number, chunk), (file, part_number + 1)));
            Ok::<_, std::io::Error>(next)
        });

        let mut parts: Vec<UploadedPart> = chunks
            .map_err(|e| UploadError::io(path, e))
            .map_ok(|(part_number, body)| async move {
                store
                    .upload_part(key, upload_id, part_number, body)
                    .await
                    .map_err(UploadError::from)
            })
            .try_buffer_unordered(self.options.queue_size)
            .try_collect()
            .await?;

        parts.sort_by_key(|part| part.part_number);
        Ok(parts)
    }
}

async fn read_part(file: &mut File, part_size: usize) -> std::io::Result<Bytes> {
    let mut buffer = Vec::with_capacity(part_size);
    file.take(part_size as u64).read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

async fn within<T>(
    deadline: Option<Deadline>,
    key: &str,
    fut: impl Future<Output = Result<T, UploadError>>,
) -> Result<T, UploadError> {
    match deadline {
        None => fut.await,
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut)
            .await
            .map_err(|_| UploadError::Timeout {
                key: key.to_string(),
                timeout_ms: deadline.budget.as_millis(),
            })?,
    }
}
