//! Warehouse error types.

use std::time::Duration;

use gcloud_client::GcloudError;
use thiserror::Error;

/// Result type alias using WarehouseError.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    Api(#[from] GcloudError),

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Job {job_id} did not finish within {timeout:?}")]
    Timeout { job_id: String, timeout: Duration },

    #[error("Invalid table reference '{0}': expected dataset.table or project.dataset.table")]
    InvalidTableRef(String),

    #[error("Invalid write disposition '{0}': expected replace, append or fail")]
    InvalidDisposition(String),

    #[error("Invalid value in column '{column}': {message}")]
    InvalidCell { column: String, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<serde_json::Error> for WarehouseError {
    fn from(err: serde_json::Error) -> Self {
        WarehouseError::UnexpectedResponse(format!("JSON error: {}", err))
    }
}
