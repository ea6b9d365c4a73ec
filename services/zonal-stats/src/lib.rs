//! Zonal statistics service library.
//!
//! Reads geometries from the warehouse, reduces Earth Engine imagery over
//! each of them and writes the results back.

pub mod config;
pub mod pipeline;
pub mod shaping;

pub use config::{JobFile, ZonalStatsJob};
pub use pipeline::{Pipeline, PipelineError, RunSummary};
