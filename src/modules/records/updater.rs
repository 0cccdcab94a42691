use super::OwningRecord;
use super::fields::{RecordUpdate, ReelUpdate};
use super::resolver::RecordResolver;
use crate::error::UploadError;
use tracing::{debug, info};

fn update_failed(record_id: &str, source: sqlx::Error) -> UploadError {
    UploadError::RecordUpdate {
        record_id: record_id.to_string(),
        source,
    }
}

/// Writes a field set to whichever record owns the id.
///
/// Content rows take every present field. Reel rows only take the storage fields of
/// [`ReelUpdate`]; anything else (status, failure reason) is dropped.
#[derive(Clone)]
pub struct RecordUpdater {
    resolver: RecordResolver,
}

impl RecordUpdater {
    pub fn new(resolver: RecordResolver) -> Self {
        Self { resolver }
    }

    pub async fn update(
        &self,
        record_id: &str,
        fields: &RecordUpdate,
    ) -> Result<OwningRecord, UploadError> {
        match self.resolver.resolve(record_id).await? {
            OwningRecord::Content(_) => {
                let content = self
                    .resolver
                    .content()
                    .update(record_id, fields)
                    .await
                    .map_err(|e| update_failed(record_id, e))?;
                info!(record_id, variant = "content", status = %content.content_status, "Record updated");
                Ok(OwningRecord::Content(content))
            }
            OwningRecord::Reel(reel) => {
                let allowed = ReelUpdate::from(fields);
                if allowed.is_empty() {
                    debug!(record_id, "Nothing a reel accepts in this update, skipping write");
                    return Ok(OwningRecord::Reel(reel));
                }
                let reel = self
                    .resolver
                    .reels()
                    .update(record_id, &allowed)
                    .await
                    .map_err(|e| update_failed(record_id, e))?;
                info!(record_id, variant = "reels", "Record updated");
                Ok(OwningRecord::Reel(reel))
            }
        }
    }
}
