use super::model::ContentItem;
use crate::modules::records::fields::RecordUpdate;
use async_trait::async_trait;
use sqlx::PgPool;

pub type DbResult<T> = Result<T, sqlx::Error>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ContentItem>>;

    /// Writes every present field in one statement and returns the updated row.
    async fn update(&self, id: &str, fields: &RecordUpdate) -> DbResult<ContentItem>;
}

#[derive(Clone)]
pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for ContentRepository {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ContentItem>> {
        let content = sqlx::query_as::<_, ContentItem>(
            r#"
            SELECT id, content_status, failure_reason, s3_bucket, s3_key, s3_thumb_key,
                   etag, checksum_sha256, file_size_bytes
            FROM content
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content)
    }

    async fn update(&self, id: &str, fields: &RecordUpdate) -> DbResult<ContentItem> {
        let content = sqlx::query_as::<_, ContentItem>(
            r#"
            UPDATE content SET
                content_status = COALESCE($2, content_status),
                failure_reason = COALESCE($3, failure_reason),
                s3_bucket = COALESCE($4, s3_bucket),
                s3_key = COALESCE($5, s3_key),
                s3_thumb_key = COALESCE($6, s3_thumb_key),
                etag = COALESCE($7, etag),
                checksum_sha256 = COALESCE($8, checksum_sha256),
                file_size_bytes = COALESCE($9, file_size_bytes)
            WHERE id = $1
            RETURNING id, content_status, failure_reason, s3_bucket, s3_key, s3_thumb_key,
                      etag, checksum_sha256, file_size_bytes
            "#,
        )
        .bind(id)
        .bind(fields.content_status.map(|s| s.as_str()))
        .bind(fields.failure_reason.as_deref())
        .bind(fields.s3_bucket.as_deref())
        .bind(fields.s3_key.as_deref())
        .bind(fields.s3_thumb_key.as_deref())
        .bind(fields.etag.as_deref())
        .bind(fields.checksum_sha256.as_deref())
        .bind(fields.file_size_bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(content)
    }
}
