//! docgate API - REST gateway
//!
//! This crate provides the HTTP surface of docgate: API key
//! authentication, document submission, job status and search
//! passthrough, plus health, metrics and OpenAPI endpoints.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;

#[cfg(test)]
mod testing;

pub use auth::{ApiKeyRegistry, AppState, AuthContext};
pub use error::{ApiError, ErrorResponse};
pub use openapi::create_openapi_routes;
pub use routes::create_router;
