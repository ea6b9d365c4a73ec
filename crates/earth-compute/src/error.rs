//! Compute error types.

use gcloud_client::GcloudError;
use thiserror::Error;

/// Result type alias using ComputeError.
pub type ComputeResult<T> = Result<T, ComputeError>;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Api(#[from] GcloudError),

    #[error("Malformed compute result: {0}")]
    MalformedResult(String),

    #[error("Request has no features")]
    NoFeatures,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
