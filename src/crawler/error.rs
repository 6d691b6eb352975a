//! Error types for the crawler module

use thiserror::Error;

/// Rejections produced while building a traversal configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The target URL is missing or empty
    #[error("URL is required")]
    MissingUrl,

    /// The target URL is not an absolute http(s) URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A blacklist entry is not a valid pattern
    #[error("Invalid blacklist pattern '{pattern}': {reason}")]
    InvalidBlacklistPattern { pattern: String, reason: String },

    /// A header override has an invalid name or value
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Failures of a whole traversal
#[derive(Debug, Error)]
pub enum TraversalError {
    /// The engine could not be started or crashed mid-run
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// The mode needed a fetched page and the engine produced none
    #[error("No page could be fetched from {url}: {detail}")]
    NoPage { url: String, detail: String },
}

impl From<tokio::task::JoinError> for TraversalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::EngineFailure(format!("Task join error: {}", err))
    }
}
