//! Common types shared across the zonal statistics crates.

pub mod band_calc;
pub mod bbox;
pub mod date_range;
pub mod error;
pub mod geometry;
pub mod statistic;
pub mod table;
pub mod wkt;

pub use band_calc::BandCalc;
pub use bbox::BoundingBox;
pub use date_range::DateRange;
pub use error::{ZonalError, ZonalResult};
pub use geometry::{Geometry, Position};
pub use statistic::Statistic;
pub use table::{CellValue, Column, FieldType, Table, GEOMETRY_COLUMN_NAMES};
pub use wkt::WktError;
