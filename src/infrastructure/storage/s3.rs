use super::{ObjectMeta, ObjectStore, StorageError, StorageResult, UploadedPart};
use crate::config::settings::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tracing::info;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);
        builder.set_endpoint_url(config.endpoint.clone());

        let client = Client::from_conf(builder.build());

        match &config.endpoint {
            Some(endpoint) => info!("✅ S3 client ready (endpoint {}, bucket {})", endpoint, config.bucket),
            None => info!("✅ S3 client ready (region {}, bucket {})", config.region, config.bucket),
        }

        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        }
    }

    fn describe(&self, err: aws_sdk_s3::Error) -> String {
        if err.code() == Some("InvalidAccessKeyId") && self.endpoint.is_none() {
            return "InvalidAccessKeyId: the credentials look like MinIO credentials but \
                    AWS_S3_ENDPOINT is not set; point it at the MinIO URL and set \
                    AWS_S3_FORCE_PATH_STYLE=true"
                .to_string();
        }
        DisplayErrorContext(&err).to_string()
    }

    async fn send_put(
        &self,
        key: &str,
        meta: &ObjectMeta,
        body: Bytes,
    ) -> Result<Option<String>, aws_sdk_s3::Error> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&meta.content_type)
            .set_metadata(Some(meta.metadata.clone()))
            .body(ByteStream::from(body))
            .send()
            .await?;

        Ok(result.e_tag().map(str::to_string))
    }

    async fn send_create_multipart(
        &self,
        key: &str,
        meta: &ObjectMeta,
    ) -> Result<Option<String>, aws_sdk_s3::Error> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&meta.content_type)
            .set_metadata(Some(meta.metadata.clone()))
            .send()
            .await?;

        Ok(result.upload_id().map(str::to_string))
    }

    async fn send_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<Option<String>, aws_sdk_s3::Error> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await?;

        Ok(result.e_tag().map(str::to_string))
    }

    async fn send_complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<Option<String>, aws_sdk_s3::Error> {
        let parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .e_tag(part.etag)
                    .part_number(part.part_number)
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(result.e_tag().map(str::to_string))
    }

    async fn send_abort(&self, key: &str, upload_id: &str) -> Result<(), aws_sdk_s3::Error> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn public_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }

    async fn put_object(&self, key: &str, meta: &ObjectMeta, body: Bytes) -> StorageResult<String> {
        self.send_put(key, meta, body)
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: self.describe(e),
            })?
            .ok_or(StorageError::MissingField("ETag"))
    }

    async fn create_multipart_upload(&self, key: &str, meta: &ObjectMeta) -> StorageResult<String> {
        self.send_create_multipart(key, meta)
            .await
            .map_err(|e| StorageError::CreateMultipart {
                key: key.to_string(),
                message: self.describe(e),
            })?
            .ok_or(StorageError::MissingField("UploadId"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        let etag = self
            .send_part(key, upload_id, part_number, body)
            .await
            .map_err(|e| StorageError::Part {
                key: key.to_string(),
                part_number,
                message: self.describe(e),
            })?
            .ok_or(StorageError::MissingField("part ETag"))?;

        Ok(UploadedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<String> {
        self.send_complete(key, upload_id, parts)
            .await
            .map_err(|e| StorageError::Complete {
                key: key.to_string(),
                message: self.describe(e),
            })?
            .ok_or(StorageError::MissingField("ETag"))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.send_abort(key, upload_id)
            .await
            .map_err(|e| StorageError::Abort {
                key: key.to_string(),
                message: self.describe(e),
            })
    }
}
