use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::connect_to_db;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::s3::StorageService;
use crate::state::AppState;
use crate::workers::media::MediaWorker;
use crate::workers::pool::{PoolOptions, WorkerPool};
use anyhow::Context;
use std::sync::Arc;

pub async fn create_state(config: AppConfig) -> anyhow::Result<AppState> {
    let db = connect_to_db(&config.database_url, config.queue.concurrency)
        .await
        .context("failed to connect to PostgreSQL")?;
    let redis = RedisService::new(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    let storage = StorageService::new(&config.storage);

    Ok(AppState::new(config, db, redis, storage))
}

/// The media worker pool for `state.config.queue`.
pub fn create_pool(state: &AppState) -> WorkerPool {
    WorkerPool::new(
        state.queue.clone(),
        Arc::new(MediaWorker::from_state(state)),
        PoolOptions::from(&state.config.queue),
    )
}
