//! Earth Engine compute for zonal statistics.
//!
//! Builds the serialized expression graph for a per-feature reduction and
//! evaluates it with the `value:compute` REST method.

pub mod client;
pub mod error;
pub mod expression;
pub mod zonal;

use async_trait::async_trait;

pub use client::{EarthEngineClient, EarthEngineConfig};
pub use error::{ComputeError, ComputeResult};
pub use expression::{Expression, ExpressionBuilder, ValueNode};
pub use zonal::{IndexedGeometry, ZonalFeature, ZonalRequest, RESULT_BAND};

/// Remote evaluation of zonal statistics.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Reduce the request's imagery over each of its features.
    ///
    /// Returns one entry per input feature, in any order.
    async fn zonal_statistics(&self, request: &ZonalRequest) -> ComputeResult<Vec<ZonalFeature>>;
}
