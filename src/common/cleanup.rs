use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of a best-effort removal. Callers are free to drop it.
#[derive(Debug)]
pub enum Cleanup {
    Removed,
    AlreadyGone,
    Failed(io::Error),
}

impl Cleanup {
    pub fn is_removed(&self) -> bool {
        matches!(self, Cleanup::Removed)
    }
}

/// Deletes a staged file, logging instead of failing.
pub async fn remove_staged(path: &Path) -> Cleanup {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed staged file");
            Cleanup::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Cleanup::AlreadyGone,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove staged file");
            Cleanup::Failed(e)
        }
    }
}
