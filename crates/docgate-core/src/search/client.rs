//! Elasticsearch client implementation

use async_trait::async_trait;
use base64::Engine;
use docgate_common::config::SearchConfig;
use docgate_common::types::IndexName;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bulk::BulkBody;

/// Errors raised while talking to the search engine
#[derive(Debug, Error)]
pub enum IndexStoreError {
    #[error("Search engine configuration error: {0}")]
    Configuration(String),

    #[error("Search engine request failed: {0}")]
    Transport(String),

    #[error("Search engine returned {status}: {body}")]
    Engine { status: u16, body: String },

    #[error("Failed to encode or decode search engine payload: {0}")]
    Serialization(String),
}

impl From<IndexStoreError> for docgate_common::Error {
    fn from(e: IndexStoreError) -> Self {
        match e {
            IndexStoreError::Configuration(msg) => docgate_common::Error::Config(msg),
            other => docgate_common::Error::Upstream(other.to_string()),
        }
    }
}

/// When written documents become visible to search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Acknowledge immediately
    None,
    /// Force a refresh of the affected shards
    Immediate,
    /// Acknowledge once a refresh made the write visible
    WaitFor,
}

impl RefreshPolicy {
    pub fn as_param(&self) -> &'static str {
        match self {
            RefreshPolicy::None => "false",
            RefreshPolicy::Immediate => "true",
            RefreshPolicy::WaitFor => "wait_for",
        }
    }
}

/// Bulk-write and query access to tenant indices.
///
/// Implementations do not retry; errors reach the caller unchanged.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Apply a bulk body to `index` and return the raw engine response
    async fn bulk(
        &self,
        index: &IndexName,
        body: &BulkBody,
        refresh: RefreshPolicy,
    ) -> Result<Value, IndexStoreError>;

    /// Run an engine-native query against `index` and return the raw response
    async fn search(&self, index: &IndexName, query: &Value) -> Result<Value, IndexStoreError>;

    /// Check that the engine answers
    async fn health_check(&self) -> Result<(), IndexStoreError>;
}

/// Decode an Elastic Cloud id (`name:base64(host$es_uuid$kibana_uuid)`)
/// into the HTTPS endpoint of the Elasticsearch cluster.
pub fn cloud_id_to_url(cloud_id: &str) -> Result<String, IndexStoreError> {
    let encoded = cloud_id
        .split_once(':')
        .map(|(_, encoded)| encoded)
        .ok_or_else(|| IndexStoreError::Configuration("cloud_id is missing ':'".to_string()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| IndexStoreError::Configuration(format!("cloud_id is not base64: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| IndexStoreError::Configuration(format!("cloud_id is not UTF-8: {}", e)))?;

    let mut parts = decoded.split('$');
    match (parts.next(), parts.next()) {
        (Some(host), Some(es_uuid)) if !host.is_empty() && !es_uuid.is_empty() => {
            Ok(format!("https://{}.{}", es_uuid, host))
        }
        _ => Err(IndexStoreError::Configuration(
            "cloud_id does not contain a host and cluster id".to_string(),
        )),
    }
}

/// Elasticsearch client speaking the REST API over reqwest
pub struct ElasticsearchClient {
    base_url: String,
    config: SearchConfig,
    client: Client,
}

impl ElasticsearchClient {
    /// Create a new Elasticsearch client
    pub fn new(config: SearchConfig) -> Result<Self, IndexStoreError> {
        let base_url = match config.cloud_id.as_deref() {
            Some(cloud_id) => cloud_id_to_url(cloud_id)?,
            None => config.url.trim_end_matches('/').to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexStoreError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %base_url, "Created Elasticsearch client");

        Ok(Self {
            base_url,
            config,
            client,
        })
    }

    /// Build a request with the configured credentials
    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.request(method, &url);

        if let Some(api_key) = &self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// Turn a response into its JSON body, or an engine error for non-2xx
    async fn into_json(response: reqwest::Response, what: &str) -> Result<Value, IndexStoreError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| IndexStoreError::Serialization(format!("{} response: {}", what, e)))
        } else {
            let body = response.text().await.unwrap_or_else(|e| {
                warn!("Failed to read {} error body: {}", what, e);
                String::new()
            });
            error!(status = status.as_u16(), "{} failed: {}", what, body);
            Err(IndexStoreError::Engine {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl IndexStore for ElasticsearchClient {
    async fn bulk(
        &self,
        index: &IndexName,
        body: &BulkBody,
        refresh: RefreshPolicy,
    ) -> Result<Value, IndexStoreError> {
        let payload = body
            .to_ndjson()
            .map_err(|e| IndexStoreError::Serialization(e.to_string()))?;
        let path = format!("/{}/_bulk", index);

        let response = self
            .build_request(reqwest::Method::POST, &path)
            .query(&[("refresh", refresh.as_param())])
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .map_err(|e| IndexStoreError::Transport(format!("Bulk request failed: {}", e)))?;

        let result = Self::into_json(response, "Bulk").await?;
        let errors = result.get("errors").and_then(Value::as_bool).unwrap_or(false);
        debug!(
            index = %index,
            operations = body.len(),
            errors,
            "Bulk request completed"
        );
        Ok(result)
    }

    async fn search(&self, index: &IndexName, query: &Value) -> Result<Value, IndexStoreError> {
        let path = format!("/{}/_search", index);

        let response = self
            .build_request(reqwest::Method::POST, &path)
            .query(&[("ignore_unavailable", "true")])
            .json(query)
            .send()
            .await
            .map_err(|e| IndexStoreError::Transport(format!("Search failed: {}", e)))?;

        let result = Self::into_json(response, "Search").await?;
        let took = result.get("took").and_then(Value::as_u64).unwrap_or(0);
        debug!(index = %index, took, "Search completed");
        Ok(result)
    }

    async fn health_check(&self) -> Result<(), IndexStoreError> {
        let response = self
            .build_request(reqwest::Method::GET, "/_cluster/health")
            .send()
            .await
            .map_err(|e| IndexStoreError::Transport(format!("Health check request failed: {}", e)))?;

        Self::into_json(response, "Health check").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_common::types::UserIdentity;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alice_index() -> IndexName {
        IndexName::for_user("zeta_alpha", &UserIdentity::parse("alice").unwrap()).unwrap()
    }

    fn client_for(server: &MockServer) -> ElasticsearchClient {
        ElasticsearchClient::new(SearchConfig {
            url: server.uri(),
            username: Some("elastic".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_cloud_id_decoding() {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode("us-east-1.aws.found.io$abc123$def456");
        let url = cloud_id_to_url(&format!("my-deployment:{}", encoded)).unwrap();
        assert_eq!(url, "https://abc123.us-east-1.aws.found.io");

        assert!(cloud_id_to_url("no-separator").is_err());
        assert!(cloud_id_to_url("name:!!!").is_err());
    }

    #[test]
    fn test_refresh_params() {
        assert_eq!(RefreshPolicy::WaitFor.as_param(), "wait_for");
        assert_eq!(RefreshPolicy::Immediate.as_param(), "true");
        assert_eq!(RefreshPolicy::None.as_param(), "false");
    }

    #[tokio::test]
    async fn test_bulk_sends_ndjson_with_wait_for() {
        let server = MockServer::start().await;
        let index = alice_index();
        let doc = json!({"a": 1}).as_object().unwrap().clone();
        let body = BulkBody::for_documents(&index, vec![doc]);

        Mock::given(method("POST"))
            .and(path("/zeta_alpha_alice/_bulk"))
            .and(query_param("refresh", "wait_for"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string(
                "{\"index\":{\"_index\":\"zeta_alpha_alice\"}}\n{\"a\":1}\n".to_string(),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"took": 3, "errors": false, "items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .bulk(&index, &body, RefreshPolicy::WaitFor)
            .await
            .unwrap();
        assert_eq!(result["errors"], json!(false));
    }

    #[tokio::test]
    async fn test_search_is_scoped_and_passes_query_through() {
        let server = MockServer::start().await;
        let query = json!({"query": {"match_all": {}}});

        Mock::given(method("POST"))
            .and(path("/zeta_alpha_alice/_search"))
            .and(query_param("ignore_unavailable", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 1,
                "hits": {"total": {"value": 0, "relation": "eq"}, "hits": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .search(&alice_index(), &query)
            .await
            .unwrap();
        assert_eq!(result["hits"]["hits"], json!([]));
    }

    #[tokio::test]
    async fn test_engine_errors_propagate() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zeta_alpha_alice/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("parsing_exception"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search(&alice_index(), &json!({"query": {"bogus": {}}}))
            .await
            .unwrap_err();

        match err {
            IndexStoreError::Engine { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "parsing_exception");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_errors_map_to_upstream() {
        let client = ElasticsearchClient::new(SearchConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

        let err = client.health_check().await.unwrap_err();
        assert!(matches!(err, IndexStoreError::Transport(_)));
        let common: docgate_common::Error = err.into();
        assert_eq!(common.status_code(), 502);
    }
}
