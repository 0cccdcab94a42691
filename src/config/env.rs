use std::env;
use std::str::FromStr;

pub enum EnvKey {
    DatabaseUrl,
    RedisUrl,
    S3Bucket,
    S3Endpoint,
    S3Region,
    S3AccessKey,
    S3SecretKey,
    S3ForcePathStyle,
    UploadPartSizeMb,
    UploadQueueSize,
    WorkerConcurrency,
    AttachmentTimeoutMs,
    QueueName,
    QueuePollIntervalMs,
    QueueLockDurationMs,
    RecordLeaseTtlSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::S3Bucket => "AWS_S3_BUCKET",
            EnvKey::S3Endpoint => "AWS_S3_ENDPOINT",
            EnvKey::S3Region => "AWS_REGION",
            EnvKey::S3AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::S3SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::S3ForcePathStyle => "AWS_S3_FORCE_PATH_STYLE",
            EnvKey::UploadPartSizeMb => "UPLOAD_PART_SIZE_MB",
            EnvKey::UploadQueueSize => "UPLOAD_QUEUE_SIZE",
            EnvKey::WorkerConcurrency => "WORKER_CONCURRENCY",
            EnvKey::AttachmentTimeoutMs => "S3_UPLOAD_TIMEOUT_MS",
            EnvKey::QueueName => "MEDIA_QUEUE_NAME",
            EnvKey::QueuePollIntervalMs => "QUEUE_POLL_INTERVAL_MS",
            EnvKey::QueueLockDurationMs => "QUEUE_LOCK_DURATION_MS",
            EnvKey::RecordLeaseTtlSecs => "RECORD_LEASE_TTL_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Like [`get`], but treats an empty value as unset.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
