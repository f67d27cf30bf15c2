/*
[INPUT]:  Error sources (HTTP, API, decoding, configuration, WebSocket)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the stream adapter
#[derive(Error, Debug)]
pub enum StreamError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stream payload did not match the schema of its channel
    #[error("Failed to decode {channel} message: {source}")]
    Decode {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl StreamError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Http(_)
                | StreamError::RateLimit { .. }
                | StreamError::Timeout { .. }
                | StreamError::WebSocket(_)
                | StreamError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            StreamError::RateLimit { retry_after } => Some(*retry_after),
            StreamError::Timeout { .. } => Some(1),
            _ => None,
        }
    }

    /// Check if error was raised by input validation
    pub fn is_config_error(&self) -> bool {
        matches!(self, StreamError::Config(_))
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        StreamError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        StreamError::Config(message.into())
    }
}

/// Result type alias for stream adapter operations
pub type Result<T> = std::result::Result<T, StreamError>;
