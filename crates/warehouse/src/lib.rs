//! Warehouse access for the zonal statistics pipeline.
//!
//! The [`Warehouse`] trait is the seam the pipeline depends on;
//! [`BigQueryClient`] implements it over the BigQuery v2 REST API.

pub mod bigquery;
pub mod error;
pub mod table_ref;
pub mod types;

use async_trait::async_trait;
use zonal_common::Table;

pub use bigquery::{BigQueryClient, BigQueryConfig};
pub use error::{WarehouseError, WarehouseResult};
pub use table_ref::{TableRef, WriteDisposition};

/// Read query results and write result tables.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a standard-SQL query billed to `project_id` and collect every row.
    async fn query(&self, project_id: &str, sql: &str) -> WarehouseResult<Table>;

    /// Write a whole table to `destination`.
    async fn write_table(
        &self,
        destination: &TableRef,
        table: &Table,
        disposition: WriteDisposition,
    ) -> WarehouseResult<()>;
}
