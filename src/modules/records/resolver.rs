use super::OwningRecord;
use crate::error::UploadError;
use crate::modules::content::repository::ContentStore;
use crate::modules::reels::repository::ReelStore;
use std::sync::Arc;
use tracing::debug;

fn lookup_failed(record_id: &str, source: sqlx::Error) -> UploadError {
    UploadError::Database {
        record_id: record_id.to_string(),
        source,
    }
}

#[derive(Clone)]
pub struct RecordResolver {
    content: Arc<dyn ContentStore>,
    reels: Arc<dyn ReelStore>,
}

impl RecordResolver {
    pub fn new(content: Arc<dyn ContentStore>, reels: Arc<dyn ReelStore>) -> Self {
        Self { content, reels }
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn reels(&self) -> &Arc<dyn ReelStore> {
        &self.reels
    }

    /// Content is probed first and wins if both tables hold the id. Not cached.
    pub async fn resolve(&self, record_id: &str) -> Result<OwningRecord, UploadError> {
        let content = self
            .content
            .find_by_id(record_id)
            .await
            .map_err(|e| lookup_failed(record_id, e))?;
        if let Some(content) = content {
            debug!(record_id, variant = "content", "Resolved record");
            return Ok(OwningRecord::Content(content));
        }

        let reel = self
            .reels
            .find_by_id(record_id)
            .await
            .map_err(|e| lookup_failed(record_id, e))?;
        if let Some(reel) = reel {
            debug!(record_id, variant = "reels", "Resolved record");
            return Ok(OwningRecord::Reel(reel));
        }

        Err(UploadError::NotFound(record_id.to_string()))
    }
}
