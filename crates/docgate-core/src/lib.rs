//! docgate Core - job queue, workers and search engine access
//!
//! This crate provides the durable job queue facade, the worker pool that
//! executes queued tasks, the bulk indexing task and the search engine
//! client every tenant operation goes through.

pub mod metrics;
pub mod queue;
pub mod search;
pub mod tasks;

pub use metrics::Metrics;
pub use queue::{JobQueue, TaskDescriptor, TaskError, TaskHandler, TaskRegistry, WorkerPool};
pub use search::{BulkBody, ElasticsearchClient, IndexStore, IndexStoreError, RefreshPolicy};
pub use tasks::{BulkIndexArgs, BulkIndexTask, BULK_INDEX_TASK};
