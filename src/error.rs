//! Error types for the trawl crate

use thiserror::Error;

use crate::crawler::{ConfigError, TraversalError};
use crate::monitor::ScheduleError;

/// Result type for trawl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for trawl operations
#[derive(Debug, Error)]
pub enum Error {
    /// A required request field is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// The request could not be turned into a traversal configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The crawling engine could not complete the traversal
    #[error("Traversal failed: {0}")]
    Traversal(#[from] TraversalError),

    /// The monitor schedule could not be evaluated
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Config(_) | Error::Schedule(_)
        )
    }
}
