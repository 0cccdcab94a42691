use super::{
    FailOutcome, JobCounts, JobId, JobOptions, JobQueue, JobRecord, JobState, QueueError,
    STALLED_REASON, from_millis, now_millis,
};
use crate::infrastructure::redis::client::RedisService;
use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Promotes due delayed jobs, settles stalled ones, then claims the head of `wait`.
///
/// A stalled job is charged one attempt; it goes back to `wait` while attempts remain and
/// to `failed` (or is deleted, with `remove_on_fail`) once they are used up.
///
/// KEYS: wait, delayed, active, failed. ARGV: now, lock deadline, token, job key prefix,
/// stalled reason.
const FETCH_NEXT: &str = r"
local now = tonumber(ARGV[1])
local function requeue(id)
  local job = ARGV[4] .. id
  local priority = tonumber(redis.call('HGET', job, 'priority') or '0')
  redis.call('ZADD', KEYS[1], priority * 4294967296 + tonumber(id), id)
  redis.call('HSET', job, 'state', 'waiting')
  redis.call('HDEL', job, 'lock_token')
end
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)) do
  redis.call('ZREM', KEYS[2], id)
  requeue(id)
end
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)) do
  redis.call('ZREM', KEYS[3], id)
  local job = ARGV[4] .. id
  local made = redis.call('HINCRBY', job, 'attempts_made', 1)
  redis.call('HINCRBY', job, 'stalled_count', 1)
  redis.call('HSET', job, 'failed_reason', ARGV[5])
  local max = tonumber(redis.call('HGET', job, 'max_attempts') or '1')
  if made < max then
    requeue(id)
  elseif redis.call('HGET', job, 'remove_on_fail') == '1' then
    redis.call('DEL', job)
  else
    redis.call('HDEL', job, 'lock_token')
    redis.call('HSET', job, 'state', 'failed', 'finished_at', ARGV[1])
    redis.call('ZADD', KEYS[4], ARGV[1], id)
  end
end
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then
  return false
end
local id = popped[1]
redis.call('ZADD', KEYS[3], ARGV[2], id)
redis.call('HSET', ARGV[4] .. id, 'state', 'active', 'lock_token', ARGV[3], 'processed_at', ARGV[1])
return id
";

/// KEYS: active, job. ARGV: token, deadline, id.
const EXTEND_LOCK: &str = r"
if redis.call('HGET', KEYS[2], 'lock_token') ~= ARGV[1] then
  return 0
end
redis.call('ZADD', KEYS[1], 'XX', ARGV[2], ARGV[3])
return 1
";

/// KEYS: active, completed, job. ARGV: token, id, now, remove.
const COMPLETE: &str = r"
if redis.call('HGET', KEYS[3], 'lock_token') ~= ARGV[1] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[2])
if ARGV[4] == '1' then
  redis.call('DEL', KEYS[3])
else
  redis.call('HDEL', KEYS[3], 'lock_token')
  redis.call('HSET', KEYS[3], 'state', 'completed', 'finished_at', ARGV[3])
  redis.call('ZADD', KEYS[2], ARGV[3], ARGV[2])
end
return 1
";

/// KEYS: active, delayed, failed, job.
/// ARGV: token, id, now, attempts made, reason, retry, ready at, remove.
const FAIL: &str = r"
if redis.call('HGET', KEYS[4], 'lock_token') ~= ARGV[1] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[2])
redis.call('HDEL', KEYS[4], 'lock_token')
redis.call('HSET', KEYS[4], 'attempts_made', ARGV[4], 'failed_reason', ARGV[5])
if ARGV[6] == '1' then
  redis.call('HSET', KEYS[4], 'state', 'delayed')
  redis.call('ZADD', KEYS[2], ARGV[7], ARGV[2])
elseif ARGV[8] == '1' then
  redis.call('DEL', KEYS[4])
else
  redis.call('HSET', KEYS[4], 'state', 'failed', 'finished_at', ARGV[3])
  redis.call('ZADD', KEYS[3], ARGV[3], ARGV[2])
end
return 1
";

/// Jobs in `wait` are ordered by priority, then by id (FIFO).
fn wait_score(priority: u32, id: JobId) -> f64 {
    priority as f64 * 4_294_967_296.0 + id as f64
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

#[derive(Clone)]
pub struct RedisJobQueue {
    redis: RedisService,
    prefix: String,
    fetch_next: Script,
    extend_lock: Script,
    complete: Script,
    fail: Script,
}

impl RedisJobQueue {
    pub fn new(redis: RedisService, queue_name: &str) -> Self {
        info!(queue = queue_name, "Using Redis job queue");
        Self {
            redis,
            prefix: format!("mq:{}", queue_name),
            fetch_next: Script::new(FETCH_NEXT),
            extend_lock: Script::new(EXTEND_LOCK),
            complete: Script::new(COMPLETE),
            fail: Script::new(FAIL),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    async fn load(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.redis.conn();
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_record(id, fields).map(Some)
    }
}

fn parse_record(id: JobId, mut fields: HashMap<String, String>) -> Result<JobRecord, QueueError> {
    let malformed = |reason: &str| QueueError::Malformed {
        id,
        reason: reason.to_string(),
    };
    let millis = |value: Option<String>| {
        value
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(from_millis)
    };

    let name = fields.remove("name").ok_or_else(|| malformed("missing name"))?;
    let data = serde_json::from_str(fields.get("data").map(String::as_str).unwrap_or("null"))?;
    let options: JobOptions = match fields.get("opts") {
        Some(raw) => serde_json::from_str(raw)?,
        None => JobOptions::default(),
    };
    let state = fields
        .get("state")
        .and_then(|s| JobState::parse(s))
        .ok_or_else(|| malformed("unknown state"))?;
    let attempts_made = fields
        .get("attempts_made")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let created_at =
        millis(fields.remove("created_at")).ok_or_else(|| malformed("missing created_at"))?;

    Ok(JobRecord {
        id,
        name,
        data,
        options,
        state,
        attempts_made,
        failed_reason: fields.remove("failed_reason"),
        created_at,
        processed_at: millis(fields.remove("processed_at")),
        finished_at: millis(fields.remove("finished_at")),
    })
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    #[tracing::instrument(skip(self, data, options), fields(queue = %self.prefix))]
    async fn enqueue(
        &self,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        let mut conn = self.redis.conn();
        let id: JobId = conn.incr(self.key("id"), 1u64).await?;

        let fields: Vec<(&str, String)> = vec![
            ("name", name.to_string()),
            ("data", serde_json::to_string(&data)?),
            ("opts", serde_json::to_string(&options)?),
            ("state", JobState::Waiting.as_str().to_string()),
            ("attempts_made", "0".to_string()),
            ("priority", options.priority.to_string()),
            ("max_attempts", options.attempts.max(1).to_string()),
            ("remove_on_fail", flag(options.remove_on_fail).to_string()),
            ("created_at", now_millis().to_string()),
        ];

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(self.job_key(id), &fields)
            .ignore()
            .zadd(self.key("wait"), id, wait_score(options.priority, id))
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(job_id = id, job_name = name, "Job enqueued");
        Ok(id)
    }

    async fn fetch_next(
        &self,
        token: &str,
        lock_duration: Duration,
    ) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.redis.conn();
        let now = now_millis();
        let deadline = now + lock_duration.as_millis() as i64;

        let claimed: Option<JobId> = self
            .fetch_next
            .key(self.key("wait"))
            .key(self.key("delayed"))
            .key(self.key("active"))
            .key(self.key("failed"))
            .arg(now)
            .arg(deadline)
            .arg(token)
            .arg(self.job_prefix())
            .arg(STALLED_REASON)
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = claimed else {
            return Ok(None);
        };

        match self.load(id).await? {
            Some(job) => {
                debug!(job_id = id, job_name = %job.name, "Claimed job");
                Ok(Some(job))
            }
            None => {
                warn!(job_id = id, "Claimed job has no data, dropping it");
                let _: () = conn.zrem(self.key("active"), id).await?;
                Ok(None)
            }
        }
    }

    async fn extend_lock(
        &self,
        id: JobId,
        token: &str,
        lock_duration: Duration,
    ) -> Result<(), QueueError> {
        let mut conn = self.redis.conn();
        let deadline = now_millis() + lock_duration.as_millis() as i64;

        let held: i64 = self
            .extend_lock
            .key(self.key("active"))
            .key(self.job_key(id))
            .arg(token)
            .arg(deadline)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;

        if held == 1 { Ok(()) } else { Err(QueueError::LockLost(id)) }
    }

    async fn complete(&self, job: &JobRecord, token: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.conn();

        let held: i64 = self
            .complete
            .key(self.key("active"))
            .key(self.key("completed"))
            .key(self.job_key(job.id))
            .arg(token)
            .arg(job.id)
            .arg(now_millis())
            .arg(flag(job.options.remove_on_complete))
            .invoke_async(&mut conn)
            .await?;

        if held == 1 { Ok(()) } else { Err(QueueError::LockLost(job.id)) }
    }

    async fn fail(
        &self,
        job: &JobRecord,
        token: &str,
        reason: &str,
    ) -> Result<FailOutcome, QueueError> {
        let mut conn = self.redis.conn();
        let now = now_millis();
        let attempts_made = job.attempts_made + 1;
        let outcome = job.options.after_failure(attempts_made);
        let (retry, ready_at) = match outcome {
            FailOutcome::Retrying { delay } => (true, now + delay.as_millis() as i64),
            FailOutcome::Exhausted => (false, now),
        };

        let held: i64 = self
            .fail
            .key(self.key("active"))
            .key(self.key("delayed"))
            .key(self.key("failed"))
            .key(self.job_key(job.id))
            .arg(token)
            .arg(job.id)
            .arg(now)
            .arg(attempts_made)
            .arg(reason)
            .arg(flag(retry))
            .arg(ready_at)
            .arg(flag(job.options.remove_on_fail))
            .invoke_async(&mut conn)
            .await?;

        if held == 1 { Ok(outcome) } else { Err(QueueError::LockLost(job.id)) }
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        self.load(id).await
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let mut conn = self.redis.conn();
        let (waiting, delayed, active, completed, failed): (u64, u64, u64, u64, u64) =
            redis::pipe()
                .zcard(self.key("wait"))
                .zcard(self.key("delayed"))
                .zcard(self.key("active"))
                .zcard(self.key("completed"))
                .zcard(self.key("failed"))
                .query_async(&mut conn)
                .await?;

        Ok(JobCounts {
            waiting,
            delayed,
            active,
            completed,
            failed,
        })
    }
}
