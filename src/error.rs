//! Error types for promptfit

use thiserror::Error;

/// Main error type for prompt optimization
#[derive(Error, Debug)]
pub enum Error {
    /// Missing credentials or invalid settings. Never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An embedding or paraphrase collaborator failed or answered with
    /// something unusable.
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that originate in a collaborator call, including
    /// transport and decoding failures.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Error::ProviderError(_) | Error::RequestError(_) | Error::JsonError(_)
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::ConfigError(_))
    }
}

/// Result type alias for promptfit operations
pub type Result<T> = std::result::Result<T, Error>;
