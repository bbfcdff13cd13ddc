//! Error types for the Notion client crate.

use ledgersync_core::store::StoreError;
use thiserror::Error;

/// Result type alias for Notion API operations.
pub type Result<T> = std::result::Result<T, NotionError>;

/// Errors that can occur while talking to the Notion REST API.
#[derive(Debug, Error)]
pub enum NotionError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the Notion API
    #[error("Notion [{code}]: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Invalid request (bad credential format, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NotionError {
    /// Create an API error from status, code, and message
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<NotionError> for StoreError {
    fn from(error: NotionError) -> Self {
        match error {
            NotionError::Api { code, message, .. } => StoreError::new(code, message),
            other => StoreError::message(other.to_string()),
        }
    }
}
