//! Error types for Chatbridge.
//!
//! Configuration failures and model-provider failures carry enough context
//! for the CLI to print a recovery hint next to the message.

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Chatbridge.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model provider failure
    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check ~/.config/chatbridge/config.toml or run `chatbridge config validate`"),
            Error::Provider(e) => e.recovery_suggestion(),
        }
    }
}

/// Failures talking to the model provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider answered with a non-success status
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// The response stream broke or reported an error mid-way
    #[error("Streaming error from {provider}: {message}")]
    StreamError { provider: String, message: String },

    /// The request never reached the provider
    #[error("Network error connecting to {provider}: {message}")]
    NetworkError { provider: String, message: String },
}

impl ProviderError {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::ApiError { status: 401, .. } => {
                Some("Check that OPENAI_API_KEY is valid and not expired")
            }
            ProviderError::ApiError { status: 404, .. } => {
                Some("Check model.model and model.base_url in your config")
            }
            ProviderError::ApiError { status: 429, .. } => {
                Some("The provider is rate limiting requests. Wait a moment and try again")
            }
            ProviderError::ApiError {
                status: 500..=599, ..
            } => Some("The provider is having issues. Try again later"),
            ProviderError::NetworkError { .. } => Some("Check your internet connection"),
            _ => None,
        }
    }

    /// Create an API error from status code and message.
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}
