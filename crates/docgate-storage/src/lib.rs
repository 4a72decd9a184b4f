//! docgate Storage - Durable job broker
//!
//! This crate owns the PostgreSQL connection pool and the `jobs` table that
//! backs the indexing queue, plus an in-memory broker for tests and
//! single-process development.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
