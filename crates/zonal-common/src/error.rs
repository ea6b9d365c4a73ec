//! Error types for the zonal statistics pipeline.

use thiserror::Error;

use crate::wkt::WktError;

/// Result type alias using ZonalError.
pub type ZonalResult<T> = Result<T, ZonalError>;

/// Errors raised while validating inputs and shaping tables.
#[derive(Debug, Error)]
pub enum ZonalError {
    #[error("The query result is empty")]
    EmptyTable,

    #[error("The query result has no geometry column (expected one of {expected}; found: {found})")]
    MissingGeometryColumn { expected: String, found: String },

    #[error("Invalid geometry in row {row}: {source}")]
    InvalidGeometry {
        row: usize,
        #[source]
        source: WktError,
    },

    #[error("Null geometry in row {0}")]
    NullGeometry(usize),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Invalid band calculation: {0}")]
    InvalidBandCalc(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

impl ZonalError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Whether this error is one of the fail-fast input checks on the query result.
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            ZonalError::EmptyTable | ZonalError::MissingGeometryColumn { .. }
        )
    }
}
