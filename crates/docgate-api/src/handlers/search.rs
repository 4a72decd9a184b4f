//! Search passthrough handler

use axum::{body::Bytes, extract::State, Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{AppState, AuthContext};
use crate::error::ApiError;

/// Run an engine-native query against the caller's index and return the
/// engine response unchanged
pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let query = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("Search body is not valid JSON: {}", e)))?
    };

    state.metrics.search_requests.inc();
    debug!(user = %auth.user, index = %auth.index, "Searching");

    let response = state.store.search(&auth.index, &query).await?;
    Ok(Json(response))
}
