//! Tasks executed by the worker pool

pub mod bulk;

pub use bulk::{BulkIndexArgs, BulkIndexTask, BULK_INDEX_TASK};
