//! Bulk indexing task

use async_trait::async_trait;
use docgate_common::types::IndexName;
use docgate_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::queue::{TaskDescriptor, TaskError, TaskHandler};
use crate::search::{BulkBody, IndexStore, RefreshPolicy};

/// Name under which the bulk indexing task is registered
pub const BULK_INDEX_TASK: &str = "bulk_index";

/// Arguments of a bulk indexing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkIndexArgs {
    /// Tenant index every action must target
    pub index: IndexName,
    pub body: BulkBody,
}

/// Writes a bulk body to the caller's index and waits until it is searchable
pub struct BulkIndexTask {
    store: Arc<dyn IndexStore>,
}

impl BulkIndexTask {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    /// Build the descriptor that enqueues this task with `args`
    pub fn descriptor(args: &BulkIndexArgs) -> Result<TaskDescriptor> {
        let kwargs = serde_json::to_value(args)
            .map_err(|e| Error::Internal(format!("Failed to serialize bulk arguments: {}", e)))?;
        Ok(TaskDescriptor::new(BULK_INDEX_TASK, kwargs))
    }
}

#[async_trait]
impl TaskHandler for BulkIndexTask {
    fn name(&self) -> &'static str {
        BULK_INDEX_TASK
    }

    async fn run(&self, kwargs: Value) -> std::result::Result<Value, TaskError> {
        let args: BulkIndexArgs =
            serde_json::from_value(kwargs).map_err(|e| TaskError::InvalidArguments(e.to_string()))?;

        if !args.body.targets_only(&args.index) {
            return Err(TaskError::InvalidArguments(format!(
                "bulk body targets an index other than {}",
                args.index
            )));
        }

        if args.body.is_empty() {
            return Ok(json!({"took": 0, "errors": false, "items": []}));
        }

        let response = self
            .store
            .bulk(&args.index, &args.body, RefreshPolicy::WaitFor)
            .await
            .map_err(|e| TaskError::Execution(e.to_string()))?;

        if response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let detail = first_item_error(&response)
                .unwrap_or_else(|| "unknown item error".to_string());
            warn!(index = %args.index, "Bulk request reported item errors: {}", detail);
            return Err(TaskError::Rejected(format!(
                "Bulk request reported item errors: {}",
                detail
            )));
        }

        info!(index = %args.index, documents = args.body.len(), "Indexed documents");
        Ok(response)
    }
}

/// Describe the first failed item of a bulk response
fn first_item_error(response: &Value) -> Option<String> {
    response
        .get("items")?
        .as_array()?
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .find_map(|outcome| {
            let error = outcome.get("error")?;
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            let reason = error.get("reason").and_then(Value::as_str).unwrap_or_default();
            Some(format!("{}: {}", kind, reason))
        })
}
