//! Job Queue - enqueue and look up indexing jobs

use docgate_common::types::{JobId, UserIdentity};
use docgate_common::{Error, Result};
use docgate_storage::{JobRecord, JobRepository, NewJob, QueueStats};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::task::TaskDescriptor;
use crate::metrics::Metrics;

/// Facade over the broker used by request handlers.
///
/// Handlers only create jobs and read them; state transitions belong to the
/// worker pool.
pub struct JobQueue {
    repo: Arc<dyn JobRepository>,
    queue: String,
    max_attempts: i32,
    metrics: Arc<Metrics>,
}

impl JobQueue {
    /// Create a new job queue
    pub fn new(
        repo: Arc<dyn JobRepository>,
        queue: impl Into<String>,
        max_attempts: i32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repo,
            queue: queue.into(),
            max_attempts,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Enqueue a task on behalf of `owner` and return the new job id
    pub async fn enqueue(&self, owner: &UserIdentity, task: TaskDescriptor) -> Result<JobId> {
        let job_id = Uuid::new_v4();
        let function = task.function.clone();
        let task = serde_json::to_value(&task)
            .map_err(|e| Error::Internal(format!("Failed to serialize task: {}", e)))?;

        self.repo
            .insert(NewJob {
                id: job_id,
                queue: self.queue.clone(),
                owner: owner.as_str().to_string(),
                task,
                max_attempts: self.max_attempts,
            })
            .await?;

        self.metrics.jobs_enqueued.inc();
        info!(job_id = %job_id, user = %owner, function = %function, "Enqueued job");
        Ok(job_id)
    }

    /// Look up a job the way a client refers to it.
    ///
    /// Malformed ids, unknown ids and jobs owned by someone else all resolve
    /// to `None`, so a caller cannot tell whether a foreign job exists.
    pub async fn fetch_for(&self, owner: &UserIdentity, raw_id: &str) -> Result<Option<JobRecord>> {
        let job_id = match Uuid::parse_str(raw_id.trim()) {
            Ok(id) => id,
            Err(_) => {
                debug!(job_id = raw_id, "Job id is not a UUID");
                return Ok(None);
            }
        };

        match self.repo.get(job_id).await? {
            Some(job) if job.owner == owner.as_str() => Ok(Some(job)),
            Some(_) => {
                warn!(job_id = %job_id, user = %owner, "Job lookup by non-owner refused");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Per-status counts for this queue
    pub async fn stats(&self) -> Result<QueueStats> {
        self.repo.stats(&self.queue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_storage::MemoryJobRepository;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn queue() -> JobQueue {
        JobQueue::new(
            Arc::new(MemoryJobRepository::new()),
            "default",
            1,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn user(name: &str) -> UserIdentity {
        UserIdentity::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_then_fetch() {
        let queue = queue();
        let alice = user("alice");
        let id = queue
            .enqueue(&alice, TaskDescriptor::new("bulk_index", json!({"body": []})))
            .await
            .unwrap();

        let job = queue.fetch_for(&alice, &id.to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, "queued");
        assert_eq!(job.queue, "default");
        assert_eq!(job.task["function"], json!("bulk_index"));
        assert_eq!(queue.stats().await.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn test_job_ids_are_unique() {
        let queue = queue();
        let alice = user("alice");
        let a = queue
            .enqueue(&alice, TaskDescriptor::new("bulk_index", json!({})))
            .await
            .unwrap();
        let b = queue
            .enqueue(&alice, TaskDescriptor::new("bulk_index", json!({})))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fetch_hides_foreign_and_unknown_jobs() {
        let queue = queue();
        let id = queue
            .enqueue(&user("alice"), TaskDescriptor::new("bulk_index", json!({})))
            .await
            .unwrap();

        let bob = user("bob");
        assert!(queue.fetch_for(&bob, &id.to_string()).await.unwrap().is_none());
        assert!(queue.fetch_for(&bob, "nonexistent-id").await.unwrap().is_none());
        assert!(queue
            .fetch_for(&bob, &Uuid::new_v4().to_string())
            .await
            .unwrap()
            .is_none());
    }
}
