//! Document submission handler

use axum::{body::Bytes, extract::State, Extension, Json};
use docgate_common::types::{Document, JobId};
use docgate_core::{BulkBody, BulkIndexArgs, BulkIndexTask};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::auth::{AppState, AuthContext};
use crate::error::ApiError;

/// Response to an accepted batch
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Check that a request body is a JSON array of JSON objects
fn parse_documents(body: &[u8], max_documents: usize) -> Result<Vec<Document>, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Request body is not valid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        _ => {
            return Err(ApiError::validation(
                "Request body must be a JSON array of documents",
            ))
        }
    };

    if items.len() > max_documents {
        return Err(ApiError::validation(format!(
            "At most {} documents may be submitted per request, got {}",
            max_documents,
            items.len()
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| match item {
            Value::Object(document) => Ok(document),
            _ => Err(ApiError::validation(format!(
                "Document at position {} is not a JSON object",
                position
            ))),
        })
        .collect()
}

/// Queue a batch of documents for indexing into the caller's index
pub async fn submit_documents(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let documents = parse_documents(&body, state.api.max_documents_per_request)?;
    debug!(user = %auth.user, documents = documents.len(), "Submitting documents");

    let args = BulkIndexArgs {
        body: BulkBody::for_documents(&auth.index, documents),
        index: auth.index,
    };
    let job_id = state
        .queue
        .enqueue(&auth.user, BulkIndexTask::descriptor(&args)?)
        .await?;

    Ok(Json(SubmitResponse { job_id }))
}
