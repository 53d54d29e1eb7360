//! Application-wide error types.

use thiserror::Error;

/// Top-level failures that end the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or is incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Object storage could not be reached or provisioned.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local session state (media or log directory) could not be initialized.
    #[error("Session error: {0}")]
    Session(String),

    /// The inbound message feed failed.
    #[error("Feed error: {0}")]
    Feed(String),
}

impl AppError {
    /// Returns a stable code for structured logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Session(_) => "SESSION_ERROR",
            Self::Feed(_) => "FEED_ERROR",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
