use crate::common::upload::{FileUploader, UploadOptions};
use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::queue::redis_queue::RedisJobQueue;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::redis::lease::{LeaseStore, RedisLeaseStore};
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::content::repository::ContentRepository;
use crate::modules::records::resolver::RecordResolver;
use crate::modules::reels::repository::ReelRepository;
use std::sync::Arc;

/// Every shared client, built once at startup and handed to the components that need it.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub redis: RedisService,
    pub storage: StorageService,
    pub queue: Arc<dyn JobQueue>,
    pub leases: Arc<dyn LeaseStore>,
    pub uploader: FileUploader,
    pub resolver: RecordResolver,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        redis: RedisService,
        storage: StorageService,
    ) -> Self {
        let queue = Arc::new(RedisJobQueue::new(redis.clone(), &config.queue.name));
        let leases = Arc::new(RedisLeaseStore::new(redis.clone()));
        let uploader = FileUploader::new(
            Arc::new(storage.clone()),
            UploadOptions {
                part_size: config.upload.part_size_bytes,
                queue_size: config.upload.queue_size,
            },
        );
        let resolver = RecordResolver::new(
            Arc::new(ContentRepository::new(db.clone())),
            Arc::new(ReelRepository::new(db.clone())),
        );

        Self {
            config,
            db,
            redis,
            storage,
            queue,
            leases,
            uploader,
            resolver,
        }
    }
}
