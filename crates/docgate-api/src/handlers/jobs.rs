//! Job status handler

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use docgate_common::types::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{AppState, AuthContext};
use crate::error::ApiError;

/// Query parameters for a job lookup
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub job_id: Option<String>,
}

/// Job status as seen by its owner
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    /// Engine bulk response once finished, otherwise null
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Get the status and result of one of the caller's jobs
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<JobQuery>, QueryRejection>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;
    let job_id = query
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Missing job_id query parameter"))?;

    let job = state
        .queue
        .fetch_for(&auth.user, &job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;

    let status = job.job_status()?;
    let error = match status {
        JobStatus::Failed => job.last_error,
        _ => None,
    };

    Ok(Json(JobStatusResponse {
        status,
        result: job.result,
        error,
        enqueued_at: job.enqueued_at,
        started_at: job.started_at,
        ended_at: job.ended_at,
    }))
}
