//! docgate Common - Shared types and utilities
//!
//! This crate provides the identity and index naming types, configuration,
//! and the error taxonomy shared across all docgate components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
