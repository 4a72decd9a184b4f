//! Common types for docgate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for queued jobs
pub type JobId = Uuid;

/// A submitted document: an arbitrary JSON object
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Characters the search engine rejects in index names
const FORBIDDEN_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ':'];

/// Maximum length of an index name in bytes
pub const MAX_INDEX_NAME_BYTES: usize = 255;

/// Default prefix for tenant indices
pub const DEFAULT_TENANT_PREFIX: &str = "zeta_alpha";

fn check_index_fragment(value: &str, what: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::Validation(format!("{} must not be empty", what)));
    }

    if let Some(c) = value.chars().find(|c| {
        c.is_uppercase() || c.is_whitespace() || c.is_control() || FORBIDDEN_INDEX_CHARS.contains(c)
    }) {
        return Err(crate::Error::Validation(format!(
            "{} contains invalid character {:?}",
            what, c
        )));
    }

    Ok(())
}

/// Trusted identity of an authenticated user.
///
/// The identity is spliced verbatim into the tenant's index name, so it is
/// restricted to characters the engine accepts without rewriting. Case is
/// never folded: `Alice` is rejected instead of being mapped onto `alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    /// Validate and wrap an identity string
    pub fn parse(s: &str) -> crate::Result<Self> {
        check_index_fragment(s, "User identity")?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserIdentity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for UserIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Name of a tenant's search index: `{prefix}_{user}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    /// Derive the index owned by `user`
    pub fn for_user(prefix: &str, user: &UserIdentity) -> crate::Result<Self> {
        validate_tenant_prefix(prefix)?;

        let name = format!("{}_{}", prefix, user.as_str());
        if name.len() > MAX_INDEX_NAME_BYTES {
            return Err(crate::Error::Validation(format!(
                "Index name for user {} exceeds {} bytes",
                user, MAX_INDEX_NAME_BYTES
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a tenant prefix yields valid index names
pub fn validate_tenant_prefix(prefix: &str) -> crate::Result<()> {
    check_index_fragment(prefix, "Tenant prefix")?;
    if prefix.starts_with(['-', '_', '+', '.']) {
        return Err(crate::Error::Validation(format!(
            "Tenant prefix must not start with {:?}",
            &prefix[..1]
        )));
    }
    Ok(())
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a worker (also used while waiting for a retry)
    Queued,
    /// Claimed by a worker
    Started,
    /// Task returned a result
    Finished,
    /// Task failed and will not be retried
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "started" => Ok(JobStatus::Started),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::Error::Internal(format!("Unknown job status: {}", other))),
        }
    }
}
