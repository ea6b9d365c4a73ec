//! Error types for Google Cloud API access.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using GcloudError.
pub type GcloudResult<T> = Result<T, GcloudError>;

/// Errors raised while authenticating or calling a Google API.
#[derive(Debug, Error)]
pub enum GcloudError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from an API.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl GcloudError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GcloudError::Http(e) => e.is_connect() || e.is_timeout(),
            GcloudError::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GcloudError::Api { status, .. } => Some(*status),
            GcloudError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Statuses Google APIs document as safe to retry.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
