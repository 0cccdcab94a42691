use crate::infrastructure::queue::{Backoff, JobId, JobOptions, JobQueue, QueueError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payload of a `push-to-s3` job: a staged file waiting to be moved into object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    #[serde(alias = "contentId")]
    pub record_id: String,
    pub local_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
}

impl UploadJob {
    pub const NAME: &'static str = "push-to-s3";

    pub fn default_options() -> JobOptions {
        JobOptions {
            attempts: 5,
            backoff: Some(Backoff::Exponential { delay_ms: 30_000 }),
            remove_on_complete: true,
            remove_on_fail: false,
            ..JobOptions::default()
        }
    }

    pub async fn enqueue(&self, queue: &dyn JobQueue) -> Result<JobId, QueueError> {
        self.enqueue_with(queue, Self::default_options()).await
    }

    pub async fn enqueue_with(
        &self,
        queue: &dyn JobQueue,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        queue
            .enqueue(Self::NAME, serde_json::to_value(self)?, options)
            .await
    }
}
