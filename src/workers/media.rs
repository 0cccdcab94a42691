//! The `push-to-s3` job: move a staged video (and optional thumbnail) into object storage
//! and record where it went.

use crate::common::checksum::sha256_file;
use crate::common::cleanup::remove_staged;
use crate::common::keys::{KeyPrefix, content_type_for, media_key};
use crate::common::upload::{FileUploader, UploadedObject};
use crate::error::UploadError;
use crate::infrastructure::queue::JobRecord;
use crate::infrastructure::redis::lease::LeaseStore;
use crate::infrastructure::storage::ObjectMeta;
use crate::modules::content::events::UploadJob;
use crate::modules::content::model::ContentStatus;
use crate::modules::records::OwningRecord;
use crate::modules::records::failure::FailureMarker;
use crate::modules::records::fields::RecordUpdate;
use crate::modules::records::resolver::RecordResolver;
use crate::modules::records::updater::RecordUpdater;
use crate::state::AppState;
use crate::workers::pool::JobHandler;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Identity of one delivery of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Same for every delivery of one job, so a redelivery after a crash reclaims the record
    /// lease its earlier delivery left behind.
    pub lease_token: String,
    pub final_attempt: bool,
}

impl Attempt {
    pub fn of(job: &JobRecord) -> Self {
        Self {
            lease_token: format!("job:{}", job.id),
            final_attempt: job.is_final_attempt(),
        }
    }
}

#[derive(Clone)]
pub struct MediaWorker {
    uploader: FileUploader,
    resolver: RecordResolver,
    updater: RecordUpdater,
    failures: FailureMarker,
    leases: Arc<dyn LeaseStore>,
    lease_ttl: Duration,
}

impl MediaWorker {
    pub fn new(
        uploader: FileUploader,
        resolver: RecordResolver,
        leases: Arc<dyn LeaseStore>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            uploader,
            updater: RecordUpdater::new(resolver.clone()),
            failures: FailureMarker::new(resolver.clone()),
            resolver,
            leases,
            lease_ttl,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.uploader.clone(),
            state.resolver.clone(),
            state.leases.clone(),
            state.config.queue.record_lease_ttl(),
        )
    }

    /// One attempt at `job`, holding the record lease throughout.
    ///
    /// Staged files are deleted on success, and on failure only on the final attempt.
    /// A lease held by another job fails fast with [`UploadError::RecordBusy`] and leaves the
    /// record alone.
    pub async fn run(&self, job: &UploadJob, attempt: &Attempt) -> Result<OwningRecord, UploadError> {
        let final_attempt = attempt.final_attempt;
        let lease = format!("record:{}", job.record_id);
        let token = attempt.lease_token.as_str();
        if !self.leases.try_acquire(&lease, token, self.lease_ttl).await? {
            warn!(record_id = %job.record_id, final_attempt, "Record is leased by another job");
            if final_attempt {
                Self::remove_files(job).await;
            }
            return Err(UploadError::RecordBusy(job.record_id.clone()));
        }

        let result = self.process(job).await;

        if let Err(e) = &result {
            error!(record_id = %job.record_id, error = %e, final_attempt, "Upload failed");
            self.failures
                .mark_best_effort(&job.record_id, &e.to_string())
                .await;
        }

        if let Err(e) = self.leases.release(&lease, token).await {
            warn!(record_id = %job.record_id, error = %e, "Failed to release record lease");
        }

        if result.is_ok() || final_attempt {
            Self::remove_files(job).await;
        }

        result
    }

    async fn remove_files(job: &UploadJob) {
        remove_staged(&job.local_path).await;
        if let Some(thumbnail) = &job.thumbnail_path {
            remove_staged(thumbnail).await;
        }
    }

    async fn process(&self, job: &UploadJob) -> Result<OwningRecord, UploadError> {
        let record_id = job.record_id.as_str();
        let record = self.resolver.resolve(record_id).await?;
        info!(record_id, variant = %record.variant(), "Processing upload");

        if matches!(record, OwningRecord::Content(_)) {
            self.updater
                .update(record_id, &RecordUpdate::status(ContentStatus::UploadingS3))
                .await?;
        }

        let checksum = sha256_file(&job.local_path)
            .await
            .map_err(|e| UploadError::io(&job.local_path, e))?;
        info!(record_id, checksum = %checksum, "Checksum computed");

        let video = self
            .push(record_id, KeyPrefix::Videos, &job.local_path)
            .await?;

        let thumbnail = match &job.thumbnail_path {
            Some(path) => Some(self.push(record_id, KeyPrefix::Thumbnails, path).await?),
            None => None,
        };

        let fields = RecordUpdate {
            content_status: Some(ContentStatus::Published),
            s3_bucket: Some(self.uploader.bucket().to_string()),
            s3_key: Some(video.key),
            s3_thumb_key: thumbnail.map(|t| t.key),
            etag: Some(video.etag),
            checksum_sha256: Some(checksum),
            file_size_bytes: Some(video.size_bytes as i64),
            ..RecordUpdate::default()
        };
        let record = self.updater.update(record_id, &fields).await?;
        info!(record_id, variant = %record.variant(), "Upload recorded");
        Ok(record)
    }

    async fn push(
        &self,
        record_id: &str,
        prefix: KeyPrefix,
        path: &Path,
    ) -> Result<UploadedObject, UploadError> {
        let key = media_key(prefix, record_id, path);
        let meta = ObjectMeta::new(content_type_for(path)).with("contentId", record_id);
        let uploaded = self.uploader.upload(path, &key, &meta).await?;
        info!(record_id, key = %uploaded.key, size_bytes = uploaded.size_bytes, "Uploaded {}", prefix.as_str());
        Ok(uploaded)
    }
}

#[async_trait]
impl JobHandler for MediaWorker {
    #[tracing::instrument(skip_all, fields(job_id = job.id, job_name = %job.name))]
    async fn handle(&self, job: &JobRecord) -> anyhow::Result<()> {
        if job.name != UploadJob::NAME {
            warn!("Unknown job name, nothing to do");
            return Ok(());
        }

        let payload: UploadJob = serde_json::from_value(job.data.clone()).map_err(UploadError::from)?;
        self.run(&payload, &Attempt::of(job)).await?;
        Ok(())
    }
}
