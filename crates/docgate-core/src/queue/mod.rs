//! Job queue
//!
//! A job is a serialized [`TaskDescriptor`] stored in the broker table. The
//! API enqueues through [`JobQueue`]; a [`WorkerPool`] claims jobs, resolves
//! their handler in the [`TaskRegistry`] and records the outcome.

pub mod manager;
pub mod task;
pub mod worker;

pub use manager::JobQueue;
pub use task::{TaskDescriptor, TaskError, TaskHandler, TaskRegistry};
pub use worker::WorkerPool;
