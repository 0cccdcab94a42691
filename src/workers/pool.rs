use crate::config::settings::QueueConfig;
use crate::infrastructure::queue::{FailOutcome, JobId, JobQueue, JobRecord, QueueError};
use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::join_all;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

const DEFAULT_JITTER: Duration = Duration::from_millis(100);

/// Work done for one delivered job. An `Err` hands the job back to the queue's retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &JobRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Completed {
        job_id: JobId,
    },
    Failed {
        job_id: JobId,
        error: String,
        attempts_made: u32,
        will_retry: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each idle poll.
    pub jitter: Duration,
    /// Renewed every half period while a job runs.
    pub lock_duration: Duration,
}

impl From<&QueueConfig> for PoolOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            poll_interval: config.poll_interval(),
            jitter: DEFAULT_JITTER,
            lock_duration: config.lock_duration(),
        }
    }
}

/// Fixed set of competing consumers on one queue.
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    options: PoolOptions,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>, options: PoolOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            queue,
            handler,
            options: PoolOptions {
                concurrency: options.concurrency.max(1),
                lock_duration: options.lock_duration.max(Duration::from_millis(2)),
                ..options
            },
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Spawns one task per slot. Slots stop polling once `shutdown` fires and finish the job
    /// they hold first.
    pub fn start(&self, shutdown: CancellationToken) -> RunHandle {
        let handles = (1..=self.options.concurrency)
            .map(|slot| {
                let name = format!("media-worker-{slot}");
                info!(worker.name = %name, "Starting worker…");
                let pool = self.clone();
                let shutdown = shutdown.clone();
                let span = info_span!("worker", worker.name = %name);
                tokio::spawn(async move { pool.run(shutdown).await }.instrument(span))
            })
            .collect();

        RunHandle { handles }
    }

    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.options.jitter.is_zero() {
            return self.options.poll_interval;
        }
        let jitter_millis = u64::try_from(self.options.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::rng().random_range(0..=jitter_millis);
        self.options.poll_interval + Duration::from_millis(random_jitter)
    }

    async fn run(&self, shutdown: CancellationToken) {
        let token = Uuid::new_v4().to_string();

        while !shutdown.is_cancelled() {
            let idle = match self.run_next_job(&token).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    trace!("No jobs waiting");
                    self.sleep_duration_with_jitter()
                }
                Err(error) => {
                    error!(%error, "Failed to run job");
                    self.sleep_duration_with_jitter()
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(idle) => {}
            }
        }

        debug!("Worker stopped");
    }

    /// Returns the id of the job that ran, or `None` when nothing was waiting.
    async fn run_next_job(&self, token: &str) -> Result<Option<JobId>, QueueError> {
        let Some(job) = self.queue.fetch_next(token, self.options.lock_duration).await? else {
            return Ok(None);
        };

        let span = info_span!("job", job.id = job.id, job.name = %job.name, job.attempt = job.attempts_made + 1);
        async {
            debug!("Running job…");
            match self.execute(&job, token).await {
                Ok(()) => {
                    self.queue.complete(&job, token).await?;
                    info!("Job completed");
                    let _ = self.events.send(WorkerEvent::Completed { job_id: job.id });
                }
                Err(error) => {
                    let reason = error.to_string();
                    let outcome = self.queue.fail(&job, token, &reason).await?;
                    let will_retry = matches!(outcome, FailOutcome::Retrying { .. });
                    match outcome {
                        FailOutcome::Retrying { delay } => {
                            warn!(error = %reason, retry_in_ms = delay.as_millis() as u64, "Job failed, will retry")
                        }
                        FailOutcome::Exhausted => error!(error = %reason, "Job failed permanently"),
                    }
                    let _ = self.events.send(WorkerEvent::Failed {
                        job_id: job.id,
                        error: reason,
                        attempts_made: job.attempts_made + 1,
                        will_retry,
                    });
                }
            }
            Ok(Some(job.id))
        }
        .instrument(span)
        .await
    }

    /// Runs the handler while renewing the job lock, turning a panic into an error.
    async fn execute(&self, job: &JobRecord, token: &str) -> anyhow::Result<()> {
        let lock_duration = self.options.lock_duration;
        let handler = AssertUnwindSafe(self.handler.handle(job))
            .catch_unwind()
            .map(|result| result.map_err(|_| anyhow!("job handler panicked")).and_then(std::convert::identity));
        tokio::pin!(handler);

        let mut renew = tokio::time::interval(lock_duration / 2);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renew.tick().await;

        loop {
            tokio::select! {
                result = &mut handler => return result,
                _ = renew.tick() => {
                    if let Err(error) = self.queue.extend_lock(job.id, token, lock_duration).await {
                        warn!(%error, "Could not extend job lock");
                    }
                }
            }
        }
    }
}

/// Handle to the running slots.
#[derive(Debug)]
pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
}

impl RunHandle {
    pub async fn wait_for_shutdown(self) {
        join_all(self.handles).await.into_iter().for_each(|result| {
            if let Err(error) = result {
                warn!(%error, "Worker task panicked");
            }
        });
    }
}
