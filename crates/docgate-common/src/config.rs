//! Configuration for docgate

use crate::types::{validate_tenant_prefix, IndexName, UserIdentity, DEFAULT_TENANT_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables overriding file settings
const ENV_PREFIX: &str = "DOCGATE";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Database (job broker) configuration
    pub database: DatabaseConfig,

    /// Search engine configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Tenant index naming
    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// API key registry
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Enable Swagger UI
    #[serde(default = "default_enable_swagger")]
    pub enable_swagger: bool,

    /// Maximum documents accepted in one submission
    #[serde(default = "default_max_documents")]
    pub max_documents_per_request: usize,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            enable_swagger: default_enable_swagger(),
            max_documents_per_request: default_max_documents(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_enable_swagger() -> bool {
    true
}

fn default_max_documents() -> usize {
    10_000
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024 // 50 MiB
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Engine URL; ignored when `cloud_id` is set
    #[serde(default = "default_search_url")]
    pub url: String,

    /// Elastic Cloud deployment id
    pub cloud_id: Option<String>,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Encoded API key, sent as `Authorization: ApiKey ...`
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            cloud_id: None,
            username: None,
            password: None,
            api_key: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_search_timeout() -> u64 {
    60
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queue name the pool consumes
    #[serde(default = "default_queue_name")]
    pub queue: String,

    /// Number of concurrent worker slots
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Idle polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum execution time of a single job
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Attempts per job, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// How long finished jobs are kept
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    /// How long failed jobs are kept
    #[serde(default = "default_failure_ttl")]
    pub failure_ttl_secs: u64,

    /// Interval of the lease/TTL reaper
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: default_queue_name(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            job_timeout_secs: default_job_timeout(),
            max_attempts: default_max_attempts(),
            result_ttl_secs: default_result_ttl(),
            failure_ttl_secs: default_failure_ttl(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    500
}

fn default_job_timeout() -> u64 {
    180
}

fn default_max_attempts() -> i32 {
    1
}

fn default_result_ttl() -> u64 {
    500
}

fn default_failure_ttl() -> u64 {
    365 * 24 * 60 * 60
}

fn default_reaper_interval() -> u64 {
    30
}

/// Tenant index naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Prefix of every tenant index; changing it orphans existing indices
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            index_prefix: default_index_prefix(),
        }
    }
}

fn default_index_prefix() -> String {
    DEFAULT_TENANT_PREFIX.to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// API key registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// A single API key mapped to the identity it authenticates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    /// Identity the key resolves to
    pub user: UserIdentity,

    /// Argon2 PHC string or legacy SHA-256 hex digest of the key
    pub key_hash: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Self::build(Some(config::File::from(path).required(true)))
    }

    /// Parse configuration from a TOML string, without environment overrides
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first file found and the environment.
    ///
    /// An explicit path must exist; otherwise `./docgate.toml` and
    /// `/etc/docgate/config.toml` are tried. Variables such as
    /// `DOCGATE__SEARCH__PASSWORD` override file values.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(crate::Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let paths = [
            PathBuf::from("./docgate.toml"),
            PathBuf::from("/etc/docgate/config.toml"),
        ];

        match paths.into_iter().find(|p| p.exists()) {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("No configuration file found, using environment only");
                Self::build(None)
            }
        }
    }

    fn build(file: Option<config::File<config::FileSourceFile, config::FileFormat>>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        validate_tenant_prefix(&self.tenancy.index_prefix)
            .map_err(|e| crate::Error::Config(e.to_string()))?;

        if self.worker.concurrency == 0 {
            return Err(crate::Error::Config(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }

        if self.worker.max_attempts < 1 {
            return Err(crate::Error::Config(
                "worker.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.auth.api_keys.iter().any(|k| k.key_hash.trim().is_empty()) {
            return Err(crate::Error::Config(
                "auth.api_keys entries need a key_hash".to_string(),
            ));
        }

        for entry in &self.auth.api_keys {
            IndexName::for_user(&self.tenancy.index_prefix, &entry.user)
                .map_err(|e| crate::Error::Config(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.concurrency, 4);
        assert_eq!(worker.max_attempts, 1);
        assert_eq!(worker.job_timeout_secs, 180);

        let tenancy = TenancyConfig::default();
        assert_eq!(tenancy.index_prefix, "zeta_alpha");

        let search = SearchConfig::default();
        assert_eq!(search.url, "http://localhost:9200");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/docgate"

[search]
url = "http://es:9200"
username = "elastic"
password = "changeme"

[worker]
concurrency = 8

[[auth.api_keys]]
user = "alice"
key_hash = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/docgate");
        assert_eq!(config.search.username.as_deref(), Some("elastic"));
        assert_eq!(config.worker.concurrency, 8);
        assert_eq!(config.auth.api_keys[0].user.as_str(), "alice");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_invalid_identity() {
        let toml = r#"
[database]
url = "postgres://localhost/docgate"

[[auth.api_keys]]
user = "Not Valid"
key_hash = "abc"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        let toml = r#"
[database]
url = "postgres://localhost/docgate"

[tenancy]
index_prefix = "_bad"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let toml = r#"
[database]
url = "postgres://localhost/docgate"

[worker]
concurrency = 0
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_validate_rejects_user_with_oversized_index_name() {
        let toml = format!(
            r#"
[database]
url = "postgres://localhost/docgate"

[[auth.api_keys]]
user = "{}"
key_hash = "abc"
"#,
            "a".repeat(250)
        );
        let err = Config::from_toml(&toml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("exceeds 255 bytes"));
    }
}
