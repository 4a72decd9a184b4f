//! Worker pool - claims queued jobs and executes their tasks

use chrono::{Duration, Utc};
use docgate_common::config::WorkerConfig;
use docgate_common::Result;
use docgate_storage::{JobRecord, JobRepository};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::task::{TaskDescriptor, TaskError, TaskRegistry};
use crate::metrics::Metrics;

/// Extra time a worker gets past the job timeout before its lease expires
const LEASE_GRACE_SECS: i64 = 30;

/// Pool of worker slots sharing one broker and one task registry
pub struct WorkerPool {
    repo: Arc<dyn JobRepository>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        repo: Arc<dyn JobRepository>,
        registry: Arc<TaskRegistry>,
        config: WorkerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repo,
            registry,
            config,
            metrics,
        }
    }

    /// Spawn one task per worker slot plus the reaper.
    ///
    /// Every spawned task exits once `shutdown` flips to `true`; a slot
    /// finishes the job it is executing first.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);

        for slot in 0..self.config.concurrency {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { pool.run_slot(slot, shutdown).await }));
        }

        let pool = self.clone();
        handles.push(tokio::spawn(async move { pool.run_reaper(shutdown).await }));

        info!(
            queue = %self.config.queue,
            slots = self.config.concurrency,
            "Worker pool started"
        );
        handles
    }

    async fn run_slot(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        let idle = TokioDuration::from_millis(self.config.poll_interval_ms);
        debug!(slot, "Worker slot started");

        while !*shutdown.borrow() {
            let processed = match self.process_next().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!(slot, "Error processing queue: {}", e);
                    false
                }
            };

            if !processed {
                tokio::select! {
                    _ = sleep(idle) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        debug!(slot, "Worker slot stopped");
    }

    async fn run_reaper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(TokioDuration::from_secs(self.config.reaper_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reap().await {
                        error!("Error reaping jobs: {}", e);
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Lease granted to a claimed job
    fn lease(&self) -> Duration {
        Duration::seconds(self.config.job_timeout_secs as i64 + LEASE_GRACE_SECS)
    }

    /// Claim and execute one job. Returns false when the queue was empty.
    pub async fn process_next(&self) -> Result<bool> {
        match self.repo.claim_next(&self.config.queue, self.lease()).await? {
            Some(job) => {
                self.process_job(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute a claimed job and record its outcome
    async fn process_job(&self, job: JobRecord) {
        let job_id = job.id;
        debug!(job_id = %job_id, attempt = job.attempts, "Processing job");

        let outcome = match serde_json::from_value::<TaskDescriptor>(job.task.clone()) {
            Ok(descriptor) => self.execute(descriptor).await,
            Err(e) => Err(TaskError::InvalidArguments(format!(
                "Malformed task descriptor: {}",
                e
            ))),
        };

        let settled = match outcome {
            Ok(result) => {
                info!(job_id = %job_id, "Job completed successfully");
                self.metrics.jobs_finished.inc();
                self.repo.complete(job_id, job.attempts, result).await
            }
            Err(e) if e.is_retryable() && job.can_retry() => {
                let retry_at = Utc::now() + calculate_backoff(job.attempts);
                warn!(
                    job_id = %job_id,
                    attempt = job.attempts,
                    retry_at = %retry_at,
                    "Job failed, scheduling retry: {}",
                    e
                );
                self.metrics.jobs_requeued.inc();
                self.repo
                    .schedule_retry(job_id, job.attempts, &e.to_string(), retry_at)
                    .await
            }
            Err(e) => {
                error!(job_id = %job_id, attempt = job.attempts, "Job failed: {}", e);
                self.metrics.jobs_failed.inc();
                self.repo.fail(job_id, job.attempts, &e.to_string()).await
            }
        };

        match settled {
            Ok(true) => {}
            Ok(false) => warn!(
                job_id = %job_id,
                "Job was no longer held by this worker when settling"
            ),
            Err(e) => error!(job_id = %job_id, "Failed to record job outcome: {}", e),
        }
    }

    async fn execute(&self, descriptor: TaskDescriptor) -> std::result::Result<serde_json::Value, TaskError> {
        let timeout = TokioDuration::from_secs(self.config.job_timeout_secs);
        match tokio::time::timeout(timeout, self.registry.dispatch(descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout(self.config.job_timeout_secs)),
        }
    }

    /// Redeliver jobs with expired leases and purge settled jobs past their TTL
    pub async fn reap(&self) -> Result<()> {
        let now = Utc::now();

        let sweep = self.repo.requeue_expired(now).await?;
        if sweep.requeued > 0 || sweep.abandoned > 0 {
            warn!(
                requeued = sweep.requeued,
                abandoned = sweep.abandoned,
                "Recovered jobs with expired leases"
            );
            self.metrics.jobs_requeued.inc_by(sweep.requeued);
            self.metrics.jobs_failed.inc_by(sweep.abandoned);
        }

        let purged = self
            .repo
            .purge_ended(
                now - Duration::seconds(self.config.result_ttl_secs as i64),
                now - Duration::seconds(self.config.failure_ttl_secs as i64),
            )
            .await?;
        if purged > 0 {
            debug!(purged, "Purged expired jobs");
        }

        Ok(())
    }
}

/// Calculate exponential backoff delay
fn calculate_backoff(attempts: i32) -> Duration {
    // Base: 1 second, max: 5 minutes
    let seconds = 2_i64.saturating_pow(attempts.max(0) as u32).min(300);
    Duration::seconds(seconds)
}
