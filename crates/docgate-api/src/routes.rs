//! API routes

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{documents, health, jobs, search};
use crate::openapi::create_openapi_routes;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(health::metrics))
        .with_state(state.clone());

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .route("/documents", post(documents::submit_documents))
        .route("/jobs", get(jobs::get_job))
        .route("/search", post(search::search))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state.clone());

    let mut router = Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(metrics_routes);

    // OpenAPI documentation routes
    if state.api.enable_swagger {
        router = router.merge(create_openapi_routes());
    }

    router.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use crate::testing::{key, key_header, TestApp};
    use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
    use docgate_common::config::ApiConfig;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    async fn submit(app: &TestApp, api_key: &'static str, documents: Value) -> String {
        let response = app
            .server
            .post("/api/v1/documents")
            .add_header(key_header(), key(api_key))
            .json(&documents)
            .await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        body["job_id"].as_str().unwrap().to_string()
    }

    async fn search_all(app: &TestApp, api_key: &'static str) -> Value {
        let response = app
            .server
            .post("/api/v1/search")
            .add_header(key_header(), key(api_key))
            .json(&json!({}))
            .await;
        response.assert_status(StatusCode::OK);
        response.json()
    }

    fn sources(response: &Value) -> Vec<Value> {
        response["hits"]["hits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|hit| hit["_source"].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_tenants_only_see_their_own_documents() {
        let app = TestApp::new();
        let job_id = submit(&app, "alice-key", json!([{"a": 1}, {"b": 2}])).await;

        app.run_pending_jobs().await;

        let status: Value = app
            .server
            .get("/api/v1/jobs")
            .add_header(key_header(), key("alice-key"))
            .add_query_param("job_id", &job_id)
            .await
            .json();
        assert_eq!(status["status"], json!("finished"));

        assert_eq!(
            sources(&search_all(&app, "alice-key").await),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
        assert!(sources(&search_all(&app, "bob-key").await).is_empty());
    }

    #[tokio::test]
    async fn test_bearer_authentication() {
        let app = TestApp::new();

        app.server
            .post("/api/v1/search")
            .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer bob-key"))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_openapi_routes_follow_config() {
        let app = TestApp::new();
        let spec: Value = app.server.get("/openapi.json").await.json();
        assert!(spec["paths"]["/api/v1/documents"]["post"].is_object());
        app.server.get("/docs").await.assert_status(StatusCode::OK);

        let app = TestApp::with_api_config(ApiConfig {
            enable_swagger: false,
            ..Default::default()
        });
        app.server
            .get("/openapi.json")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let app = TestApp::with_api_config(ApiConfig {
            max_body_bytes: 64,
            ..Default::default()
        });
        let documents: Vec<Value> = (0..20).map(|i| json!({"n": i})).collect();

        app.server
            .post("/api/v1/documents")
            .add_header(key_header(), key("alice-key"))
            .json(&documents)
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }
}
