//! Database models

use chrono::{DateTime, Utc};
use docgate_common::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// A row of the `jobs` table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: String,
    /// Identity of the user that enqueued the job
    pub owner: String,
    /// Serialized task descriptor
    pub task: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Parsed lifecycle state
    pub fn job_status(&self) -> docgate_common::Result<JobStatus> {
        self.status.parse()
    }

    /// Whether another attempt is allowed after the current one
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Input for enqueueing a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub id: JobId,
    pub queue: String,
    pub owner: String,
    pub task: serde_json::Value,
    pub max_attempts: i32,
}

/// Outcome of a lease sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseSweep {
    /// Jobs handed back to the queue for redelivery
    pub requeued: u64,
    /// Jobs that ran out of attempts and were marked failed
    pub abandoned: u64,
}

/// Per-status job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub started: i64,
    pub finished: i64,
    pub failed: i64,
}
