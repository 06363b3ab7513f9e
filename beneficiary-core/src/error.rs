//! Error types for the resolver

use thiserror::Error;

/// Resolver-wide error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BeneficiaryError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BeneficiaryError {
    pub fn api(msg: impl Into<String>) -> Self {
        BeneficiaryError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        BeneficiaryError::Network(msg.into())
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        BeneficiaryError::Timeout { timeout_ms }
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        BeneficiaryError::RateLimited(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        BeneficiaryError::Auth(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        BeneficiaryError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BeneficiaryError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BeneficiaryError::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        BeneficiaryError::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BeneficiaryError::Internal(msg.into())
    }

    /// Map an upstream HTTP status into the matching error variant
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => BeneficiaryError::Auth(format!("HTTP {}: {}", status, body)),
            404 => BeneficiaryError::NotFound(format!("HTTP {}: {}", status, body)),
            429 => BeneficiaryError::RateLimited(format!("HTTP {}: {}", status, body)),
            _ => BeneficiaryError::Api(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// Result type alias for resolver operations
pub type BeneficiaryResult<T> = Result<T, BeneficiaryError>;
