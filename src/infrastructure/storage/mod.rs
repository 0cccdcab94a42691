//! Object storage abstraction.
//!
//! The uploader only needs the five S3 multipart primitives plus a single-shot put, so that
//! is all the trait exposes. `s3` is the production backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

pub mod s3;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("put of {key} failed: {message}")]
    Put { key: String, message: String },

    #[error("could not start multipart upload of {key}: {message}")]
    CreateMultipart { key: String, message: String },

    #[error("part {part_number} of {key} failed: {message}")]
    Part {
        key: String,
        part_number: i32,
        message: String,
    },

    #[error("could not complete multipart upload of {key}: {message}")]
    Complete { key: String, message: String },

    #[error("could not abort multipart upload of {key}: {message}")]
    Abort { key: String, message: String },

    #[error("storage misconfigured: {0}")]
    Config(String),

    #[error("store returned no {0}")]
    MissingField(&'static str),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Content type and user metadata attached to a new object.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

impl ObjectMeta {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Publicly reachable URL of `key`.
    fn public_url(&self, key: &str) -> String;

    /// Single request upload. Returns the integrity tag.
    async fn put_object(&self, key: &str, meta: &ObjectMeta, body: Bytes) -> StorageResult<String>;

    /// Returns the upload id.
    async fn create_multipart_upload(&self, key: &str, meta: &ObjectMeta) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart>;

    /// `parts` must be sorted by part number. Returns the integrity tag of the assembled object.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<String>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}
