//! Search engine access
//!
//! Every read and write against tenant indices goes through the
//! [`IndexStore`] trait; [`ElasticsearchClient`] is the HTTP implementation.

pub mod bulk;
pub mod client;

pub use bulk::{BulkBody, IndexAction};
pub use client::{ElasticsearchClient, IndexStore, IndexStoreError, RefreshPolicy};
