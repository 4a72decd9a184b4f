//! Task descriptors and handlers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Serializable unit of work: which handler to run and with what arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub function: String,
    pub kwargs: Value,
}

impl TaskDescriptor {
    pub fn new(function: impl Into<String>, kwargs: Value) -> Self {
        Self {
            function: function.into(),
            kwargs,
        }
    }
}

/// Failure of a task execution, recorded on the job
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid task arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    /// The engine refused part of the work; resending yields the same answer
    #[error("{0}")]
    Rejected(String),

    #[error("Job exceeded timeout of {0}s")]
    Timeout(u64),
}

impl TaskError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Execution(_) | TaskError::Timeout(_))
    }
}

/// A function a worker can execute
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Name under which descriptors refer to this handler
    fn name(&self) -> &'static str;

    async fn run(&self, kwargs: Value) -> Result<Value, TaskError>;
}

/// Handlers known to a worker pool
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Look up the handler of `descriptor` and run it
    pub async fn dispatch(&self, descriptor: TaskDescriptor) -> Result<Value, TaskError> {
        let handler = self
            .get(&descriptor.function)
            .ok_or_else(|| TaskError::UnknownTask(descriptor.function.clone()))?;
        handler.run(descriptor.kwargs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run(&self, kwargs: Value) -> Result<Value, TaskError> {
            Ok(kwargs)
        }
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(Echo));

        let out = registry
            .dispatch(TaskDescriptor::new("echo", json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(out, json!({"x": 1}));

        let err = registry
            .dispatch(TaskDescriptor::new("missing", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TaskError::Execution("engine unavailable".to_string()).is_retryable());
        assert!(TaskError::Timeout(30).is_retryable());
        assert!(!TaskError::Rejected("mapper_parsing_exception".to_string()).is_retryable());
        assert!(!TaskError::InvalidArguments("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_descriptor_serialization() {
        let descriptor = TaskDescriptor::new("bulk_index", json!({"body": []}));
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value, json!({"function": "bulk_index", "kwargs": {"body": []}}));
    }
}
