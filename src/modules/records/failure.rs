use super::OwningRecord;
use super::fields::RecordUpdate;
use super::resolver::RecordResolver;
use crate::error::UploadError;
use crate::modules::content::model::ContentItem;
use tracing::{info, warn};

/// Records a terminal failure on the owning record where the record type can hold one.
#[derive(Clone)]
pub struct FailureMarker {
    resolver: RecordResolver,
}

impl FailureMarker {
    pub fn new(resolver: RecordResolver) -> Self {
        Self { resolver }
    }

    /// Content gets `content_status = failed` and the reason. Reels have nowhere to put the
    /// failure, so nothing is written and `None` is returned.
    pub async fn mark(
        &self,
        record_id: &str,
        reason: &str,
    ) -> Result<Option<ContentItem>, UploadError> {
        match self.resolver.resolve(record_id).await? {
            OwningRecord::Content(_) => {
                let content = self
                    .resolver
                    .content()
                    .update(record_id, &RecordUpdate::failed(reason))
                    .await
                    .map_err(|source| UploadError::RecordUpdate {
                        record_id: record_id.to_string(),
                        source,
                    })?;
                info!(record_id, reason, "Marked content as failed");
                Ok(Some(content))
            }
            OwningRecord::Reel(_) => Ok(None),
        }
    }

    /// [`FailureMarker::mark`], logging instead of returning errors.
    pub async fn mark_best_effort(&self, record_id: &str, reason: &str) {
        if let Err(e) = self.mark(record_id, reason).await {
            warn!(record_id, error = %e, "Could not record failure on the owning record");
        }
    }
}
