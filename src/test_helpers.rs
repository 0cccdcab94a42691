//! In-memory stand-ins for every external collaborator.

use crate::infrastructure::queue::{
    FailOutcome, JobCounts, JobId, JobOptions, JobQueue, JobRecord, JobState, QueueError,
    STALLED_REASON,
};
use crate::infrastructure::redis::lease::LeaseStore;
use crate::infrastructure::storage::{
    ObjectMeta, ObjectStore, StorageError, StorageResult, UploadedPart,
};
use crate::modules::content::model::ContentItem;
use crate::modules::content::repository::{ContentStore, DbResult};
use crate::modules::records::fields::{RecordUpdate, ReelUpdate};
use crate::modules::reels::model::ReelItem;
use crate::modules::reels::repository::ReelStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Object storage

#[derive(Default)]
struct ObjectState {
    objects: HashMap<String, (Vec<u8>, ObjectMeta)>,
    uploads: HashMap<String, (String, ObjectMeta, BTreeMap<i32, Vec<u8>>)>,
    next_upload: u64,
    multipart_started: usize,
    aborted: usize,
    failing_parts: HashSet<i32>,
    fail_puts: bool,
    part_delay: Duration,
    create_delay: Duration,
}

pub struct MemoryObjectStore {
    bucket: String,
    state: Mutex<ObjectState>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(ObjectState::default()),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).map(|(body, _)| body.clone())
    }

    pub fn meta(&self, key: &str) -> Option<ObjectMeta> {
        self.state.lock().unwrap().objects.get(key).map(|(_, meta)| meta.clone())
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn multipart_started(&self) -> usize {
        self.state.lock().unwrap().multipart_started
    }

    pub fn aborted(&self) -> usize {
        self.state.lock().unwrap().aborted
    }

    /// Ids of multipart uploads that were neither completed nor aborted.
    pub fn open_uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.keys().cloned().collect()
    }

    pub fn fail_part(&self, part_number: i32) {
        self.state.lock().unwrap().failing_parts.insert(part_number);
    }

    pub fn fail_puts(&self) {
        self.state.lock().unwrap().fail_puts = true;
    }

    /// Applied to every put and every part.
    pub fn set_part_delay(&self, delay: Duration) {
        self.state.lock().unwrap().part_delay = delay;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = delay;
    }

    fn delay(&self) -> Duration {
        self.state.lock().unwrap().part_delay
    }
}

fn etag_of(body: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("\"{}\"", &hex::encode(Sha256::digest(body))[..32])
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    async fn put_object(&self, key: &str, meta: &ObjectMeta, body: Bytes) -> StorageResult<String> {
        tokio::time::sleep(self.delay()).await;
        let mut state = self.state.lock().unwrap();
        if state.fail_puts {
            return Err(StorageError::Put {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        let etag = etag_of(&body);
        state.objects.insert(key.to_string(), (body.to_vec(), meta.clone()));
        Ok(etag)
    }

    async fn create_multipart_upload(&self, key: &str, meta: &ObjectMeta) -> StorageResult<String> {
        let create_delay = self.state.lock().unwrap().create_delay;
        tokio::time::sleep(create_delay).await;
        let mut state = self.state.lock().unwrap();
        state.next_upload += 1;
        state.multipart_started += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state
            .uploads
            .insert(upload_id.clone(), (key.to_string(), meta.clone(), BTreeMap::new()));
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        tokio::time::sleep(self.delay()).await;
        let mut state = self.state.lock().unwrap();
        let part_error = |message: &str| StorageError::Part {
            key: key.to_string(),
            part_number,
            message: message.to_string(),
        };
        if state.failing_parts.contains(&part_number) {
            return Err(part_error("injected failure"));
        }
        let etag = etag_of(&body);
        let (_, _, parts) = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| part_error("no such upload"))?;
        parts.insert(part_number, body.to_vec());
        Ok(UploadedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<String> {
        let mut state = self.state.lock().unwrap();
        let complete_error = |message: &str| StorageError::Complete {
            key: key.to_string(),
            message: message.to_string(),
        };
        let (_, meta, stored) = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| complete_error("no such upload"))?;
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(complete_error("parts out of order"));
        }
        let mut body = Vec::new();
        for part in &parts {
            let chunk = stored
                .get(&part.part_number)
                .ok_or_else(|| complete_error("missing part"))?;
            body.extend_from_slice(chunk);
        }
        let etag = format!("{}-{}", etag_of(&body).trim_end_matches('"'), parts.len());
        state.objects.insert(key.to_string(), (body, meta));
        Ok(format!("{}\"", etag))
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.uploads.remove(upload_id);
        state.aborted += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record stores

fn injected_db_error() -> sqlx::Error {
    sqlx::Error::Protocol("injected failure".to_string())
}

#[derive(Default)]
struct ContentState {
    rows: HashMap<String, ContentItem>,
    updates: Vec<(String, RecordUpdate)>,
    lookups: usize,
    fail_updates: bool,
    fail_lookups: bool,
}

#[derive(Default)]
pub struct MemoryContentStore {
    state: Mutex<ContentState>,
}

impl MemoryContentStore {
    pub fn insert(&self, item: ContentItem) {
        self.state.lock().unwrap().rows.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &str) -> Option<ContentItem> {
        self.state.lock().unwrap().rows.get(id).cloned()
    }

    /// Every update applied, oldest first.
    pub fn updates(&self) -> Vec<(String, RecordUpdate)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    pub fn fail_lookups(&self) {
        self.state.lock().unwrap().fail_lookups = true;
    }
}

fn apply<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ContentItem>> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        if state.fail_lookups {
            return Err(injected_db_error());
        }
        Ok(state.rows.get(id).cloned())
    }

    async fn update(&self, id: &str, fields: &RecordUpdate) -> DbResult<ContentItem> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(injected_db_error());
        }
        let row = state.rows.get_mut(id).ok_or(sqlx::Error::RowNotFound)?;
        if let Some(status) = fields.content_status {
            row.content_status = status.to_string();
        }
        apply(&mut row.failure_reason, &fields.failure_reason);
        apply(&mut row.s3_bucket, &fields.s3_bucket);
        apply(&mut row.s3_key, &fields.s3_key);
        apply(&mut row.s3_thumb_key, &fields.s3_thumb_key);
        apply(&mut row.etag, &fields.etag);
        apply(&mut row.checksum_sha256, &fields.checksum_sha256);
        apply(&mut row.file_size_bytes, &fields.file_size_bytes);
        let updated = row.clone();
        state.updates.push((id.to_string(), fields.clone()));
        Ok(updated)
    }
}

#[derive(Default)]
struct ReelState {
    rows: HashMap<String, ReelItem>,
    lookups: usize,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryReelStore {
    state: Mutex<ReelState>,
}

impl MemoryReelStore {
    pub fn insert(&self, item: ReelItem) {
        self.state.lock().unwrap().rows.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &str) -> Option<ReelItem> {
        self.state.lock().unwrap().rows.get(id).cloned()
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

#[async_trait]
impl ReelStore for MemoryReelStore {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<ReelItem>> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state.rows.get(id).cloned())
    }

    async fn update(&self, id: &str, fields: &ReelUpdate) -> DbResult<ReelItem> {
        let mut state = self.state.lock().unwrap();
        let row = state.rows.get_mut(id).ok_or(sqlx::Error::RowNotFound)?;
        apply(&mut row.s3_bucket, &fields.s3_bucket);
        apply(&mut row.s3_key, &fields.s3_key);
        apply(&mut row.s3_thumb_key, &fields.s3_thumb_key);
        apply(&mut row.etag, &fields.etag);
        apply(&mut row.checksum_sha256, &fields.checksum_sha256);
        apply(&mut row.file_size_bytes, &fields.file_size_bytes);
        let updated = row.clone();
        state.writes += 1;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Job queue

struct StoredJob {
    record: JobRecord,
    token: Option<String>,
    lock_until: Instant,
    ready_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: JobId,
    jobs: BTreeMap<JobId, StoredJob>,
    attempts_started: HashMap<JobId, u32>,
}

/// Same state machine as the Redis queue, driven by tokio's clock.
#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    /// Times a job has been handed to a worker.
    pub fn deliveries(&self, id: JobId) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts_started
            .get(&id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let now = Instant::now();
        state.jobs.insert(
            id,
            StoredJob {
                record: JobRecord {
                    id,
                    name: name.to_string(),
                    data,
                    options,
                    state: JobState::Waiting,
                    attempts_made: 0,
                    failed_reason: None,
                    created_at: OffsetDateTime::now_utc(),
                    processed_at: None,
                    finished_at: None,
                },
                token: None,
                lock_until: now,
                ready_at: now,
            },
        );
        Ok(id)
    }

    async fn fetch_next(
        &self,
        token: &str,
        lock_duration: Duration,
    ) -> Result<Option<JobRecord>, QueueError> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let mut exhausted_and_removed = Vec::new();
        for job in state.jobs.values_mut() {
            let due = job.record.state == JobState::Delayed && job.ready_at <= now;
            let stalled = job.record.state == JobState::Active && job.lock_until <= now;
            if stalled {
                job.token = None;
                job.record.attempts_made += 1;
                job.record.failed_reason = Some(STALLED_REASON.to_string());
                if job.record.attempts_made < job.record.options.attempts.max(1) {
                    job.record.state = JobState::Waiting;
                } else if job.record.options.remove_on_fail {
                    exhausted_and_removed.push(job.record.id);
                } else {
                    job.record.state = JobState::Failed;
                    job.record.finished_at = Some(OffsetDateTime::now_utc());
                }
            } else if due {
                job.record.state = JobState::Waiting;
                job.token = None;
            }
        }
        for id in exhausted_and_removed {
            state.jobs.remove(&id);
        }

        let next = state
            .jobs
            .values()
            .filter(|job| job.record.state == JobState::Waiting)
            .min_by_key(|job| (job.record.options.priority, job.record.id))
            .map(|job| job.record.id);
        let Some(id) = next else {
            return Ok(None);
        };

        *state.attempts_started.entry(id).or_default() += 1;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(QueueError::LockLost(id))?;
        job.record.state = JobState::Active;
        job.record.processed_at = Some(OffsetDateTime::now_utc());
        job.token = Some(token.to_string());
        job.lock_until = now + lock_duration;
        Ok(Some(job.record.clone()))
    }

    async fn extend_lock(
        &self,
        id: JobId,
        token: &str,
        lock_duration: Duration,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        match state.jobs.get_mut(&id) {
            Some(job) if job.token.as_deref() == Some(token) => {
                job.lock_until = Instant::now() + lock_duration;
                Ok(())
            }
            _ => Err(QueueError::LockLost(id)),
        }
    }

    async fn complete(&self, job: &JobRecord, token: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let held = matches!(state.jobs.get(&job.id), Some(stored) if stored.token.as_deref() == Some(token));
        if !held {
            return Err(QueueError::LockLost(job.id));
        }
        if job.options.remove_on_complete {
            state.jobs.remove(&job.id);
        } else if let Some(stored) = state.jobs.get_mut(&job.id) {
            stored.token = None;
            stored.record.state = JobState::Completed;
            stored.record.finished_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn fail(
        &self,
        job: &JobRecord,
        token: &str,
        reason: &str,
    ) -> Result<FailOutcome, QueueError> {
        let mut state = self.state.lock().unwrap();
        let stored = match state.jobs.get_mut(&job.id) {
            Some(stored) if stored.token.as_deref() == Some(token) => stored,
            _ => return Err(QueueError::LockLost(job.id)),
        };
        let attempts_made = job.attempts_made + 1;
        let outcome = job.options.after_failure(attempts_made);
        stored.token = None;
        stored.record.attempts_made = attempts_made;
        stored.record.failed_reason = Some(reason.to_string());
        match outcome {
            FailOutcome::Retrying { delay } => {
                stored.record.state = JobState::Delayed;
                stored.ready_at = Instant::now() + delay;
            }
            FailOutcome::Exhausted if job.options.remove_on_fail => {
                state.jobs.remove(&job.id);
            }
            FailOutcome::Exhausted => {
                stored.record.state = JobState::Failed;
                stored.record.finished_at = Some(OffsetDateTime::now_utc());
            }
        }
        Ok(outcome)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.state.lock().unwrap().jobs.get(&id).map(|job| job.record.clone()))
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let state = self.state.lock().unwrap();
        let mut counts = JobCounts::default();
        for job in state.jobs.values() {
            match job.record.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Leases

/// Honours TTLs against tokio's clock.
#[derive(Default)]
pub struct MemoryLeaseStore {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLeaseStore {
    pub fn holder(&self, name: &str) -> Option<String> {
        let held = self.held.lock().unwrap();
        held.get(name)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(token, _)| token.clone())
    }

    /// Makes `name` look held by `token` for `ttl`.
    pub fn hold(&self, name: &str, token: &str, ttl: Duration) {
        self.held
            .lock()
            .unwrap()
            .insert(name.to_string(), (token.to_string(), Instant::now() + ttl));
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, QueueError> {
        let mut held = self.held.lock().unwrap();
        let now = Instant::now();
        if matches!(held.get(name), Some((holder, expires)) if *expires > now && holder != token) {
            return Ok(false);
        }
        held.insert(name.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, name: &str, token: &str) -> Result<(), QueueError> {
        let mut held = self.held.lock().unwrap();
        if held.get(name).map(|(holder, _)| holder.as_str()) == Some(token) {
            held.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(attempts: u32) -> JobOptions {
        JobOptions {
            attempts,
            ..JobOptions::default()
        }
    }

    #[tokio::test]
    async fn stalled_job_is_charged_an_attempt_and_redelivered() {
        let queue = MemoryJobQueue::default();
        let id = queue.enqueue("push-to-s3", serde_json::json!({}), options(3)).await.unwrap();

        queue.fetch_next("crashed", Duration::from_millis(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let again = queue.fetch_next("w2", Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempts_made, 1);
        assert_eq!(again.failed_reason.as_deref(), Some(STALLED_REASON));
    }

    #[tokio::test]
    async fn repeated_stalls_exhaust_and_retain_the_job() {
        let queue = MemoryJobQueue::default();
        let id = queue.enqueue("push-to-s3", serde_json::json!({}), options(2)).await.unwrap();
        let short = Duration::from_millis(1);

        queue.fetch_next("crashed-1", short).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.fetch_next("crashed-2", short).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(queue.fetch_next("w3", Duration::from_secs(30)).await.unwrap().is_none());
        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.attempts_made, 2);
        assert_eq!(queue.deliveries(id), 2);
        assert_eq!(queue.counts().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn exhausted_stall_honours_remove_on_fail() {
        let queue = MemoryJobQueue::default();
        let options = JobOptions {
            remove_on_fail: true,
            ..options(1)
        };
        let id = queue.enqueue("push-to-s3", serde_json::json!({}), options).await.unwrap();

        queue.fetch_next("crashed", Duration::from_millis(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(queue.fetch_next("w2", Duration::from_secs(30)).await.unwrap().is_none());
        assert!(queue.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lease_is_reentrant_for_its_holder_and_expires() {
        let leases = MemoryLeaseStore::default();
        let ttl = Duration::from_millis(20);

        assert!(leases.try_acquire("record:C1", "job:1", ttl).await.unwrap());
        assert!(leases.try_acquire("record:C1", "job:1", ttl).await.unwrap());
        assert!(!leases.try_acquire("record:C1", "job:2", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(leases.holder("record:C1").is_none());
        assert!(leases.try_acquire("record:C1", "job:2", ttl).await.unwrap());
    }
}
