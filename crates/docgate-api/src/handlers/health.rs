//! Health check and metrics handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::auth::AppState;
use crate::error::ApiError;

/// Basic health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: String,
}

/// Readiness response with component checks
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall health status
    pub status: String,
    /// Individual component health checks
    pub checks: HealthChecks,
}

/// Individual health checks
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    /// Job broker (database) health status
    pub broker: ComponentHealth,
    /// Search engine health status
    pub search_engine: ComponentHealth,
}

/// Individual component health status
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component status (healthy/unhealthy)
    pub status: String,
    /// Response latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

async fn check<F, T, E>(name: &str, probe: F) -> ComponentHealth
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    match probe.await {
        Ok(_) => ComponentHealth {
            status: "healthy".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            warn!("Readiness check for {} failed: {}", name, e);
            ComponentHealth {
                status: "unhealthy".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Liveness check (is the process running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: the broker and the search engine both answer
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let broker = check("broker", state.queue.stats()).await;
    let search_engine = check("search engine", state.store.health_check()).await;

    let ready = broker.is_healthy() && search_engine.is_healthy();
    let (code, status) = if ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(ReadinessResponse {
            status: status.to_string(),
            checks: HealthChecks {
                broker,
                search_engine,
            },
        }),
    )
}

/// Prometheus metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| docgate_common::Error::Internal(format!("Failed to render metrics: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}
