//! Job repository
//!
//! The `jobs` table is the broker of the indexing queue. Every state
//! transition goes through this trait: the API only inserts and reads, the
//! worker pool claims and settles.

use crate::db::DatabasePool;
use crate::models::{JobRecord, LeaseSweep, NewJob, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use docgate_common::types::{JobId, JobStatus};
use docgate_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Error recorded on jobs whose worker vanished without settling them
pub const ABANDONED_ERROR: &str = "Job abandoned: worker lease expired";

/// Job repository trait
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a new job in the `queued` state
    async fn insert(&self, job: NewJob) -> Result<JobRecord>;

    /// Fetch a job by id
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>>;

    /// Atomically move the oldest due job of `queue` to `started`
    async fn claim_next(&self, queue: &str, lease: Duration) -> Result<Option<JobRecord>>;

    /// Record a successful result of claimed attempt `attempt`. Returns
    /// false if that attempt no longer holds the job (e.g. its lease was
    /// reaped and the job claimed again).
    async fn complete(&self, id: JobId, attempt: i32, result: serde_json::Value) -> Result<bool>;

    /// Record a terminal failure
    async fn fail(&self, id: JobId, attempt: i32, error: &str) -> Result<bool>;

    /// Put a job back in the queue after a failed attempt
    async fn schedule_retry(
        &self,
        id: JobId,
        attempt: i32,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Requeue or abandon `started` jobs whose lease ended before `now`
    async fn requeue_expired(&self, now: DateTime<Utc>) -> Result<LeaseSweep>;

    /// Delete settled jobs that ended before the given instants
    async fn purge_ended(
        &self,
        finished_before: DateTime<Utc>,
        failed_before: DateTime<Utc>,
    ) -> Result<u64>;

    /// Count jobs per status
    async fn stats(&self, queue: &str) -> Result<QueueStats>;
}

/// Database job repository
pub struct DbJobRepository {
    pool: DatabasePool,
}

impl DbJobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for DbJobRepository {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        let now = Utc::now();

        sqlx::query_as::<_, JobRecord>(
            r#"
            INSERT INTO jobs (id, queue, owner, task, status, attempts, max_attempts, scheduled_at, enqueued_at)
            VALUES ($1, $2, $3, $4, 'queued', 0, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.queue)
        .bind(&job.owner)
        .bind(&job.task)
        .bind(job.max_attempts)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim_next(&self, queue: &str, lease: Duration) -> Result<Option<JobRecord>> {
        let now = Utc::now();

        sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE jobs
            SET status = 'started',
                attempts = attempts + 1,
                started_at = $2,
                lease_expires_at = $3
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'queued'
                AND queue = $1
                AND scheduled_at <= $2
                ORDER BY scheduled_at ASC, enqueued_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(queue)
        .bind(now)
        .bind(now + lease)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn complete(&self, id: JobId, attempt: i32, result: serde_json::Value) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'finished', result = $3, last_error = NULL,
                ended_at = NOW(), lease_expires_at = NULL
            WHERE id = $1 AND attempts = $2 AND status = 'started'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(&result)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated.rows_affected() > 0)
    }

    async fn fail(&self, id: JobId, attempt: i32, error: &str) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $3,
                ended_at = NOW(), lease_expires_at = NULL
            WHERE id = $1 AND attempts = $2 AND status = 'started'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated.rows_affected() > 0)
    }

    async fn schedule_retry(
        &self,
        id: JobId,
        attempt: i32,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', last_error = $3, scheduled_at = $4,
                lease_expires_at = NULL
            WHERE id = $1 AND attempts = $2 AND status = 'started'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(error)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated.rows_affected() > 0)
    }

    async fn requeue_expired(&self, now: DateTime<Utc>) -> Result<LeaseSweep> {
        let pool = self.pool.pool();

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', scheduled_at = $1, lease_expires_at = NULL
            WHERE status = 'started'
            AND lease_expires_at < $1
            AND attempts < max_attempts
            "#,
        )
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let abandoned = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, ended_at = $1, lease_expires_at = NULL
            WHERE status = 'started'
            AND lease_expires_at < $1
            AND attempts >= max_attempts
            "#,
        )
        .bind(now)
        .bind(ABANDONED_ERROR)
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(LeaseSweep {
            requeued: requeued.rows_affected(),
            abandoned: abandoned.rows_affected(),
        })
    }

    async fn purge_ended(
        &self,
        finished_before: DateTime<Utc>,
        failed_before: DateTime<Utc>,
    ) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE (status = 'finished' AND ended_at < $1)
            OR (status = 'failed' AND ended_at < $2)
            "#,
        )
        .bind(finished_before)
        .bind(failed_before)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(deleted.rows_affected())
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM jobs WHERE queue = $1 GROUP BY status",
        )
        .bind(queue)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status.parse::<JobStatus>()? {
                JobStatus::Queued => stats.queued = count,
                JobStatus::Started => stats.started = count,
                JobStatus::Finished => stats.finished = count,
                JobStatus::Failed => stats.failed = count,
            }
        }

        Ok(stats)
    }
}

/// In-process job repository.
///
/// Not durable; jobs live as long as the process. Used by tests and by
/// single-process development setups.
#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn settle<F>(&self, id: JobId, attempt: i32, apply: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Started.as_str() && job.attempts == attempt => {
                apply(job);
                job.lease_expires_at = None;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        let now = Utc::now();
        let record = JobRecord {
            id: job.id,
            queue: job.queue,
            owner: job.owner,
            task: job.task,
            status: JobStatus::Queued.as_str().to_string(),
            attempts: 0,
            max_attempts: job.max_attempts,
            result: None,
            last_error: None,
            scheduled_at: now,
            enqueued_at: now,
            started_at: None,
            ended_at: None,
            lease_expires_at: None,
        };

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.id) {
            return Err(Error::Database(format!("Duplicate job id {}", record.id)));
        }
        jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn claim_next(&self, queue: &str, lease: Duration) -> Result<Option<JobRecord>> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        let next = jobs
            .values_mut()
            .filter(|j| {
                j.queue == queue
                    && j.status == JobStatus::Queued.as_str()
                    && j.scheduled_at <= now
            })
            .min_by_key(|j| (j.scheduled_at, j.enqueued_at));

        Ok(next.map(|job| {
            job.status = JobStatus::Started.as_str().to_string();
            job.attempts += 1;
            job.started_at = Some(now);
            job.lease_expires_at = Some(now + lease);
            job.clone()
        }))
    }

    async fn complete(&self, id: JobId, attempt: i32, result: serde_json::Value) -> Result<bool> {
        Ok(self
            .settle(id, attempt, |job| {
                job.status = JobStatus::Finished.as_str().to_string();
                job.result = Some(result);
                job.last_error = None;
                job.ended_at = Some(Utc::now());
            })
            .await)
    }

    async fn fail(&self, id: JobId, attempt: i32, error: &str) -> Result<bool> {
        Ok(self
            .settle(id, attempt, |job| {
                job.status = JobStatus::Failed.as_str().to_string();
                job.last_error = Some(error.to_string());
                job.ended_at = Some(Utc::now());
            })
            .await)
    }

    async fn schedule_retry(
        &self,
        id: JobId,
        attempt: i32,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .settle(id, attempt, |job| {
                job.status = JobStatus::Queued.as_str().to_string();
                job.last_error = Some(error.to_string());
                job.scheduled_at = at;
            })
            .await)
    }

    async fn requeue_expired(&self, now: DateTime<Utc>) -> Result<LeaseSweep> {
        let mut sweep = LeaseSweep::default();
        let mut jobs = self.jobs.write().await;

        for job in jobs.values_mut() {
            let expired = job.status == JobStatus::Started.as_str()
                && job.lease_expires_at.map_or(false, |l| l < now);
            if !expired {
                continue;
            }

            job.lease_expires_at = None;
            if job.can_retry() {
                job.status = JobStatus::Queued.as_str().to_string();
                job.scheduled_at = now;
                sweep.requeued += 1;
            } else {
                job.status = JobStatus::Failed.as_str().to_string();
                job.last_error = Some(ABANDONED_ERROR.to_string());
                job.ended_at = Some(now);
                sweep.abandoned += 1;
            }
        }

        Ok(sweep)
    }

    async fn purge_ended(
        &self,
        finished_before: DateTime<Utc>,
        failed_before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();

        jobs.retain(|_, job| {
            let cutoff = match job.status.as_str() {
                "finished" => finished_before,
                "failed" => failed_before,
                _ => return true,
            };
            job.ended_at.map_or(true, |ended| ended >= cutoff)
        });

        Ok((before - jobs.len()) as u64)
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let jobs = self.jobs.read().await;
        let mut stats = QueueStats::default();

        for job in jobs.values().filter(|j| j.queue == queue) {
            match job.job_status()? {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Started => stats.started += 1,
                JobStatus::Finished => stats.finished += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}
