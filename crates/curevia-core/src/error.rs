//! Error types for the resolution pipeline
//!
//! `ResolveError` is what a caller of the pipeline can observe. Knowledge
//! cache failures (`CacheError`) are recovered inside the pipeline and never
//! reach the caller.

use std::time::Duration;
use thiserror::Error;

/// Pipeline error type
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Provider timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Provider error: {0}")]
    Upstream(String),

    #[error("Invalid configuration: {0}")]
    Misconfigured(String),
}

impl ResolveError {
    /// Short machine-readable kind, used in error frames and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Validation(_) => "validation",
            ResolveError::RateLimited(_) => "rate_limited",
            ResolveError::UpstreamTimeout(_) => "upstream_timeout",
            ResolveError::Upstream(_) => "upstream_error",
            ResolveError::Misconfigured(_) => "misconfigured",
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Knowledge cache error type
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Entry not found: {0}")]
    NotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        CacheError::Embedding(e.to_string())
    }
}

/// Result type for knowledge cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Completion provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Missing provider credentials")]
    MissingCredentials,

    #[error("Request failed: {0}")]
    Http(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

impl From<ProviderError> for ResolveError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::MissingCredentials => {
                ResolveError::Misconfigured("completion provider has no API key".to_string())
            }
            other => ResolveError::Upstream(other.to_string()),
        }
    }
}

/// Session store error type
#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for SessionStoreError {
    fn from(e: rusqlite::Error) -> Self {
        SessionStoreError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for SessionStoreError {
    fn from(e: serde_json::Error) -> Self {
        SessionStoreError::Serialization(e.to_string())
    }
}
