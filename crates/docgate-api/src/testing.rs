//! In-memory fixtures for handler tests

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use docgate_common::config::{ApiConfig, ApiKeyEntry, WorkerConfig};
use docgate_common::types::{Document, IndexName, UserIdentity};
use docgate_core::{
    BulkBody, BulkIndexTask, IndexStore, IndexStoreError, JobQueue, Metrics, RefreshPolicy,
    TaskRegistry, WorkerPool,
};
use docgate_storage::MemoryJobRepository;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{hash_api_key, ApiKeyRegistry, AppState};
use crate::routes::create_router;

/// Search engine double keeping documents per index
#[derive(Default)]
pub struct InMemoryIndex {
    indices: Mutex<HashMap<String, Vec<Document>>>,
    searched: Mutex<Vec<(String, Value)>>,
    unavailable: AtomicBool,
}

impl InMemoryIndex {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn documents(&self, index: &str) -> Vec<Document> {
        self.indices.lock().await.get(index).cloned().unwrap_or_default()
    }

    pub async fn searched(&self) -> Vec<(String, Value)> {
        self.searched.lock().await.clone()
    }

    fn check_available(&self) -> Result<(), IndexStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexStoreError::Engine {
                status: 503,
                body: "no_shard_available_action_exception".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for InMemoryIndex {
    async fn bulk(
        &self,
        _index: &IndexName,
        body: &BulkBody,
        _refresh: RefreshPolicy,
    ) -> Result<Value, IndexStoreError> {
        self.check_available()?;

        let mut indices = self.indices.lock().await;
        let mut items = Vec::new();
        for (action, document) in body.operations() {
            let target = action.target().to_string();
            indices.entry(target.clone()).or_default().push(document.clone());
            items.push(json!({"index": {"_index": target, "result": "created", "status": 201}}));
        }

        Ok(json!({"took": 1, "errors": false, "items": items}))
    }

    async fn search(&self, index: &IndexName, query: &Value) -> Result<Value, IndexStoreError> {
        self.check_available()?;
        self.searched
            .lock()
            .await
            .push((index.to_string(), query.clone()));

        let hits: Vec<Value> = self
            .documents(index.as_str())
            .await
            .into_iter()
            .map(|doc| json!({"_index": index.as_str(), "_source": doc}))
            .collect();

        Ok(json!({
            "took": 1,
            "timed_out": false,
            "hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}
        }))
    }

    async fn health_check(&self) -> Result<(), IndexStoreError> {
        self.check_available()
    }
}

/// A router wired to in-memory collaborators, with `alice` and `bob` configured
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryIndex>,
    pub repo: Arc<MemoryJobRepository>,
    pub metrics: Arc<Metrics>,
    workers: WorkerPool,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_api_config(ApiConfig::default())
    }

    pub fn with_api_config(api: ApiConfig) -> Self {
        let repo = Arc::new(MemoryJobRepository::new());
        let store = Arc::new(InMemoryIndex::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let worker_config = WorkerConfig::default();

        let queue = Arc::new(JobQueue::new(
            repo.clone(),
            worker_config.queue.clone(),
            worker_config.max_attempts,
            metrics.clone(),
        ));

        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(BulkIndexTask::new(store.clone())));
        let workers = WorkerPool::new(
            repo.clone(),
            Arc::new(registry),
            worker_config,
            metrics.clone(),
        );

        let api_keys = ApiKeyRegistry::new(vec![
            ApiKeyEntry {
                user: UserIdentity::parse("alice").unwrap(),
                key_hash: hash_api_key("alice-key"),
            },
            ApiKeyEntry {
                user: UserIdentity::parse("bob").unwrap(),
                key_hash: hash_api_key("bob-key"),
            },
        ]);

        let state = Arc::new(AppState {
            queue,
            store: store.clone(),
            api_keys,
            metrics: metrics.clone(),
            tenant_prefix: "zeta_alpha".to_string(),
            api,
        });

        Self {
            server: TestServer::new(create_router(state)).unwrap(),
            store,
            repo,
            metrics,
            workers,
        }
    }

    /// Execute every job that is ready
    pub async fn run_pending_jobs(&self) {
        while self.workers.process_next().await.unwrap() {}
    }
}

pub fn key_header() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

pub fn key(value: &'static str) -> HeaderValue {
    HeaderValue::from_static(value)
}
