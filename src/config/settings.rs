use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub force_path_style: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UploadConfig {
    pub part_size_bytes: usize,
    pub queue_size: usize,
    pub attachment_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub lock_duration_ms: u64,
    pub record_lease_ttl_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub queue: QueueConfig,
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|_| ConfigError::Missing(name))
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let endpoint = env::get_opt(EnvKey::S3Endpoint);
        // MinIO and most S3-compatible stores need path-style addressing.
        let force_path_style = env::get_parsed(EnvKey::S3ForcePathStyle, endpoint.is_some());

        Ok(Self {
            database_url: required(EnvKey::DatabaseUrl)?,
            redis_url: required(EnvKey::RedisUrl)?,
            storage: StorageConfig {
                bucket: required(EnvKey::S3Bucket)?,
                endpoint,
                region: env::get_or(EnvKey::S3Region, "us-east-1"),
                access_key: required(EnvKey::S3AccessKey)?,
                secret_key: required(EnvKey::S3SecretKey)?,
                force_path_style,
            },
            upload: UploadConfig {
                part_size_bytes: env::get_parsed(EnvKey::UploadPartSizeMb, 10usize).max(1) * MIB,
                queue_size: env::get_parsed(EnvKey::UploadQueueSize, 4usize).max(1),
                attachment_timeout_ms: env::get_parsed(EnvKey::AttachmentTimeoutMs, 15_000),
            },
            queue: QueueConfig {
                name: env::get_or(EnvKey::QueueName, "media"),
                concurrency: env::get_parsed(EnvKey::WorkerConcurrency, 2usize).max(1),
                poll_interval_ms: env::get_parsed(EnvKey::QueuePollIntervalMs, 1_000),
                lock_duration_ms: env::get_parsed(EnvKey::QueueLockDurationMs, 30_000),
                record_lease_ttl_secs: env::get_parsed(EnvKey::RecordLeaseTtlSecs, 3_600),
            },
        })
    }
}

impl UploadConfig {
    pub fn attachment_timeout(&self) -> Duration {
        Duration::from_millis(self.attachment_timeout_ms)
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_ms)
    }

    pub fn record_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.record_lease_ttl_secs)
    }
}
