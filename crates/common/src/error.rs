//! Universal error types for Folio.
//!
//! Module clients return these; the provider trait impls turn them into
//! degraded defaults before they reach the aggregator.

use thiserror::Error;

/// Top-level error type for all Folio operations.
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider error ({provider}): {message}")]
    Upstream {
        provider: String,
        message: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FolioError {
    /// Shorthand for an upstream protocol error.
    pub fn upstream(provider: &str, message: impl Into<String>) -> Self {
        FolioError::Upstream {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

pub type FolioResult<T> = Result<T, FolioError>;
