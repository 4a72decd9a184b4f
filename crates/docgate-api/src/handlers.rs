//! API request handlers

pub mod documents;
pub mod health;
pub mod jobs;
pub mod search;

pub use health::*;
