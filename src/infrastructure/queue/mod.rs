//! Durable job queue.
//!
//! Jobs move `waiting -> active -> (completed | delayed | failed)`. Delayed jobs return to
//! `waiting` once their backoff has elapsed, and active jobs whose lock expires (a crashed
//! worker) go back to `waiting` as well, which is what makes delivery at-least-once. A stall
//! counts as a failed attempt, so a job that keeps killing its worker ends up `failed`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

pub mod redis_queue;

pub type JobId = u64;

/// `failed_reason` recorded when a job's lock expired while it was active.
pub const STALLED_REASON: &str = "job stalled: lock expired before the job finished";

/// Upper bound on any single retry delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed job {id}: {reason}")]
    Malformed { id: JobId, reason: String },

    #[error("lock on job {0} is no longer held by this worker")]
    LockLost(JobId),

    #[error("job serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    Fixed {
        #[serde(rename = "delay")]
        delay_ms: u64,
    },
    Exponential {
        #[serde(rename = "delay")]
        delay_ms: u64,
    },
}

impl Backoff {
    /// Delay before the retry that follows failed attempt number `attempts_made` (1-based).
    pub fn delay_for(&self, attempts_made: u32, cap: Duration) -> Duration {
        let delay = match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { delay_ms } => {
                let exponent = attempts_made.saturating_sub(1).min(32);
                Duration::from_millis(delay_ms.saturating_mul(1u64 << exponent))
            }
        };
        delay.min(cap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Option<Backoff>,
    #[serde(default)]
    pub priority: u32,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_backoff_cap_ms() -> u64 {
    DEFAULT_BACKOFF_CAP.as_millis() as u64
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: None,
            priority: 0,
            remove_on_complete: false,
            remove_on_fail: false,
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl JobOptions {
    /// What the queue should do after attempt number `attempts_made` failed.
    pub fn after_failure(&self, attempts_made: u32) -> FailOutcome {
        if attempts_made < self.attempts.max(1) {
            let cap = Duration::from_millis(self.backoff_cap_ms);
            let delay = self
                .backoff
                .map(|b| b.delay_for(attempts_made, cap))
                .unwrap_or(Duration::ZERO);
            FailOutcome::Retrying { delay }
        } else {
            FailOutcome::Exhausted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(JobState::Waiting),
            "delayed" => Some(JobState::Delayed),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { delay: Duration },
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub data: serde_json::Value,
    pub options: JobOptions,
    pub state: JobState,
    /// Failed attempts so far.
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
}

impl JobRecord {
    /// Whether a failure of the current attempt would be terminal.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made + 1 >= self.options.attempts.max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError>;

    /// Claims the next ready job for `token`, holding its lock for `lock_duration`.
    async fn fetch_next(
        &self,
        token: &str,
        lock_duration: Duration,
    ) -> Result<Option<JobRecord>, QueueError>;

    async fn extend_lock(
        &self,
        id: JobId,
        token: &str,
        lock_duration: Duration,
    ) -> Result<(), QueueError>;

    async fn complete(&self, job: &JobRecord, token: &str) -> Result<(), QueueError>;

    async fn fail(
        &self,
        job: &JobRecord,
        token: &str,
        reason: &str,
    ) -> Result<FailOutcome, QueueError>;

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError>;

    async fn counts(&self) -> Result<JobCounts, QueueError>;
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
}
