use super::model::ReelItem;
use crate::modules::content::repository::DbResult;
use crate::modules::records::fields::ReelUpdate;
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait ReelStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ReelItem>>;

    async fn update(&self, id: &str, fields: &ReelUpdate) -> DbResult<ReelItem>;
}

#[derive(Clone)]
pub struct ReelRepository {
    pool: PgPool,
}

impl ReelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReelStore for ReelRepository {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ReelItem>> {
        let reel = sqlx::query_as::<_, ReelItem>(
            r#"
            SELECT id, s3_bucket, s3_key, s3_thumb_key, etag, checksum_sha256, file_size_bytes
            FROM reels
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reel)
    }

    async fn update(&self, id: &str, fields: &ReelUpdate) -> DbResult<ReelItem> {
        let reel = sqlx::query_as::<_, ReelItem>(
            r#"
            UPDATE reels SET
                s3_bucket = COALESCE($2, s3_bucket),
                s3_key = COALESCE($3, s3_key),
                s3_thumb_key = COALESCE($4, s3_thumb_key),
                etag = COALESCE($5, etag),
                checksum_sha256 = COALESCE($6, checksum_sha256),
                file_size_bytes = COALESCE($7, file_size_bytes)
            WHERE id = $1
            RETURNING id, s3_bucket, s3_key, s3_thumb_key, etag, checksum_sha256, file_size_bytes
            "#,
        )
        .bind(id)
        .bind(fields.s3_bucket.as_deref())
        .bind(fields.s3_key.as_deref())
        .bind(fields.s3_thumb_key.as_deref())
        .bind(fields.etag.as_deref())
        .bind(fields.checksum_sha256.as_deref())
        .bind(fields.file_size_bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(reel)
    }
}
