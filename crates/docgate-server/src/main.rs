//! docgate - document indexing and search gateway entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docgate_api::{create_router, ApiKeyRegistry, AppState};
use docgate_common::config::{Config, LoggingConfig};
use docgate_core::{
    BulkIndexTask, ElasticsearchClient, IndexStore, JobQueue, Metrics, TaskRegistry, WorkerPool,
};
use docgate_storage::{DatabasePool, DbJobRepository, JobRepository};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "docgate",
    version,
    about = "Multi-tenant document indexing and search gateway"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true, env = "DOCGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run the HTTP API only
    Serve,
    /// Run the worker pool and reaper only
    Worker,
    /// Run the HTTP API and the worker pool in one process
    All,
    /// Print an Argon2 hash of an API key for `auth.api_keys`
    HashKey {
        /// The API key to hash
        key: String,
    },
}

impl Command {
    fn runs_api(&self) -> bool {
        matches!(self, Command::Serve | Command::All)
    }

    fn runs_workers(&self) -> bool {
        matches!(self, Command::Worker | Command::All)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::HashKey { key } = &cli.command {
        println!("{}", docgate_api::auth::hash_api_key_argon2(key)?);
        return Ok(());
    }

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    init_logging(&config.logging);

    info!(command = ?cli.command, "Starting docgate...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let metrics = Arc::new(Metrics::new()?);
    let repo: Arc<dyn JobRepository> = Arc::new(DbJobRepository::new(db_pool.clone()));
    let store: Arc<dyn IndexStore> = Arc::new(ElasticsearchClient::new(config.search.clone())?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start worker pool
    let worker_handles = if cli.command.runs_workers() {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(BulkIndexTask::new(store.clone())));

        let pool = Arc::new(WorkerPool::new(
            repo.clone(),
            Arc::new(registry),
            config.worker.clone(),
            metrics.clone(),
        ));
        pool.spawn(shutdown_rx.clone())
    } else {
        info!("Worker pool disabled");
        Vec::new()
    };

    // Start API server
    let api_handle = if cli.command.runs_api() {
        let api_keys = ApiKeyRegistry::new(config.auth.api_keys.clone());
        if api_keys.is_empty() {
            warn!("No API keys configured; every API request will be rejected");
        }

        let queue = Arc::new(JobQueue::new(
            repo.clone(),
            config.worker.queue.clone(),
            config.worker.max_attempts,
            metrics.clone(),
        ));
        info!(
            queue = queue.name(),
            api_keys = api_keys.len(),
            "Submitting jobs to queue"
        );

        let state = Arc::new(AppState {
            queue,
            store: store.clone(),
            api_keys,
            metrics: metrics.clone(),
            tenant_prefix: config.tenancy.index_prefix.clone(),
            api: config.api.clone(),
        });
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);
        Some(spawn_api(state, bind, shutdown_rx.clone()))
    } else {
        info!("API server disabled");
        None
    };

    info!("docgate started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown_tx.send_replace(true);

    if let Some(handle) = api_handle {
        if let Err(e) = handle.await {
            error!("API server task failed: {}", e);
        }
    }
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    db_pool.pool().close().await;
    info!("docgate shutdown complete");

    Ok(())
}

fn spawn_api(
    state: Arc<AppState>,
    bind: String,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let run = async {
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind API server on {}", bind))?;
            info!("Starting API server on {}", bind);

            axum::serve(listener, create_router(state))
                .with_graceful_shutdown(async move {
                    // A dropped sender also means shutdown
                    let _ = shutdown.changed().await;
                })
                .await
                .context("API server error")
        };

        if let Err(e) = run.await {
            error!("{:#}", e);
        }
    })
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},docgate=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["docgate", "--config", "/etc/docgate/config.toml", "all"]);
        assert_eq!(cli.command, Command::All);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/docgate/config.toml")));
        assert!(cli.command.runs_api());
        assert!(cli.command.runs_workers());

        let cli = Cli::parse_from(["docgate", "worker"]);
        assert!(!cli.command.runs_api());
        assert!(cli.command.runs_workers());

        let cli = Cli::parse_from(["docgate", "serve", "-c", "docgate.toml"]);
        assert!(cli.command.runs_api());
        assert!(!cli.command.runs_workers());
        assert_eq!(cli.config, Some(PathBuf::from("docgate.toml")));

        let cli = Cli::parse_from(["docgate", "hash-key", "secret"]);
        assert_eq!(
            cli.command,
            Command::HashKey {
                key: "secret".to_string()
            }
        );
    }
}
