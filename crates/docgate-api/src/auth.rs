//! Authentication module

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use docgate_common::config::{ApiConfig, ApiKeyEntry};
use docgate_common::types::{IndexName, UserIdentity};
use docgate_common::{Error, Result};
use docgate_core::{IndexStore, JobQueue, Metrics};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub store: Arc<dyn IndexStore>,
    pub api_keys: ApiKeyRegistry,
    pub metrics: Arc<Metrics>,
    /// Prefix of every tenant index name
    pub tenant_prefix: String,
    pub api: ApiConfig,
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The identity the API key resolves to
    pub user: UserIdentity,
    /// The only index this request may touch
    pub index: IndexName,
}

/// Configured API keys and the identities they authenticate
#[derive(Debug, Clone, Default)]
pub struct ApiKeyRegistry {
    entries: Vec<ApiKeyEntry>,
}

impl ApiKeyRegistry {
    pub fn new(entries: Vec<ApiKeyEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a presented key to its identity
    pub fn authenticate(&self, api_key: &str) -> Option<&UserIdentity> {
        self.entries
            .iter()
            .find(|entry| verify_api_key(api_key, &entry.key_hash))
            .map(|entry| &entry.user)
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Legacy SHA-256 hex digest of an API key
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Argon2 PHC string for an API key, suitable for `auth.api_keys`
pub fn hash_api_key_argon2(api_key: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(api_key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Failed to hash API key: {}", e)))
}

/// Verify an API key against a stored hash.
///
/// Supports both Argon2 hashes (`$argon2...`) and legacy SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        ApiError::unauthorized("Missing API key")
    })?;

    let user = state.api_keys.authenticate(api_key).cloned().ok_or_else(|| {
        warn!("Unknown API key in request to {}", request.uri().path());
        ApiError::unauthorized("Invalid API key")
    })?;

    let index = IndexName::for_user(&state.tenant_prefix, &user)?;
    debug!(user = %user, index = %index, "Request authenticated");

    request.extensions_mut().insert(AuthContext { user, index });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use pretty_assertions::assert_eq;

    fn entry(user: &str, key_hash: String) -> ApiKeyEntry {
        ApiKeyEntry {
            user: UserIdentity::parse(user).unwrap(),
            key_hash,
        }
    }

    #[test]
    fn verifies_legacy_sha256_hash() {
        let api_key = "dg_test_legacy_key";
        let legacy_hash = hash_api_key(api_key);

        assert_eq!(legacy_hash.len(), 64);
        assert!(verify_api_key(api_key, &legacy_hash));
        assert!(!verify_api_key("wrong_key", &legacy_hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "dg_test_argon2_key";
        let hash = hash_api_key_argon2(api_key).unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn registry_resolves_identity() {
        let registry = ApiKeyRegistry::new(vec![
            entry("alice", hash_api_key("alice-key")),
            entry("bob", hash_api_key_argon2("bob-key").unwrap()),
        ]);

        assert_eq!(registry.authenticate("alice-key").unwrap().as_str(), "alice");
        assert_eq!(registry.authenticate("bob-key").unwrap().as_str(), "bob");
        assert!(registry.authenticate("mallory-key").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn extracts_bearer_and_header_keys() {
        let bearer = Request::builder()
            .header("Authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_api_key(&bearer), Some("abc123"));

        let header = Request::builder()
            .header("X-API-Key", "xyz789")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_api_key(&header), Some("xyz789"));

        let basic = Request::builder()
            .header("Authorization", "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_api_key(&basic), None);
    }
}
