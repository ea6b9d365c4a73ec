//! The zonal statistics run.
//!
//! Query geometries, reduce imagery over each of them once per statistic,
//! and write a single result table.

use std::time::Instant;

use earth_compute::{ComputeError, ComputeService, IndexedGeometry, ZonalRequest};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use warehouse::{TableRef, Warehouse, WarehouseError};
use zonal_common::{Statistic, ZonalError};

use crate::config::ZonalStatsJob;
use crate::shaping::{output_table, StatisticValues};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] ZonalError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Compute error for statistic {statistic}: {source}")]
    Compute {
        statistic: Statistic,
        #[source]
        source: ComputeError,
    },
}

impl PipelineError {
    /// Whether the run stopped on the query result itself.
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, PipelineError::Input(e) if e.is_input_rejection())
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    pub statistics: Vec<Statistic>,
    /// Compute requests issued across all statistics
    pub requests: usize,
    /// Statistic cells written as null
    pub null_values: usize,
    /// Rows for which no image matched, counted per statistic
    pub empty_collection_rows: usize,
    pub destination: TableRef,
}

pub struct Pipeline<W, C> {
    warehouse: W,
    compute: C,
}

impl<W: Warehouse, C: ComputeService> Pipeline<W, C> {
    pub fn new(warehouse: W, compute: C) -> Self {
        Self { warehouse, compute }
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    #[instrument(skip(self, job), fields(destination = %job.output, collection = %job.collection))]
    pub async fn run(&self, job: &ZonalStatsJob) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        if job.max_features_per_request == 0 {
            return Err(ZonalError::invalid_parameter(
                "compute.max_features_per_request",
                "must be at least 1",
            )
            .into());
        }

        let table = self.warehouse.query(&job.source_project, &job.sql).await?;
        table.ensure_not_empty()?;

        let column = table.geometry_column()?;
        info!(
            rows = table.len(),
            geometry_column = %table.columns[column].name,
            "Loaded source rows"
        );

        let geometries = table.geometries(column)?;
        let features: Vec<IndexedGeometry> = geometries
            .iter()
            .enumerate()
            .map(|(row_index, geometry)| IndexedGeometry {
                row_index,
                geometry: geometry.clone(),
            })
            .collect();

        let mut results = Vec::with_capacity(job.statistics.len());
        let mut requests = 0;
        let mut empty_collection_rows = 0;

        for &statistic in &job.statistics {
            info!(statistic = %statistic, "Computing statistic");
            let mut values = StatisticValues::new(statistic, features.len());

            for (batch, chunk) in features.chunks(job.max_features_per_request).enumerate() {
                let request = ZonalRequest {
                    collection: job.collection.clone(),
                    date_range: job.date_range,
                    band_calc: job.band_calc.clone(),
                    statistic,
                    scale: job.scale,
                    features: chunk.to_vec(),
                };

                let reduced = self
                    .compute
                    .zonal_statistics(&request)
                    .await
                    .map_err(|source| PipelineError::Compute { statistic, source })?;
                requests += 1;

                let batch_rows = chunk.first().map(|f| f.row_index).unwrap_or(0)
                    ..chunk.last().map(|f| f.row_index + 1).unwrap_or(0);
                for feature in reduced {
                    if !batch_rows.contains(&feature.row_index) {
                        warn!(
                            statistic = %statistic,
                            row_index = feature.row_index,
                            "Ignoring result for a row outside the batch"
                        );
                        continue;
                    }
                    if feature.empty_collection {
                        empty_collection_rows += 1;
                    }
                    values.values[feature.row_index] = feature.value;
                }

                debug!(
                    statistic = %statistic,
                    batch = batch,
                    features = chunk.len(),
                    "Batch reduced"
                );
            }

            info!(
                statistic = %statistic,
                nulls = values.null_count(),
                "Statistic complete"
            );
            results.push(values);
        }

        let output = output_table(&job.band_calc, &results, &geometries);
        self.warehouse
            .write_table(&job.output, &output, job.disposition)
            .await?;

        let summary = RunSummary {
            rows: output.len(),
            statistics: job.statistics.clone(),
            requests,
            null_values: results.iter().map(StatisticValues::null_count).sum(),
            empty_collection_rows,
            destination: job.output.clone(),
        };

        info!(
            rows = summary.rows,
            statistics = summary.statistics.len(),
            requests = summary.requests,
            null_values = summary.null_values,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Zonal statistics written"
        );
        Ok(summary)
    }
}
