//! BigQuery REST client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcloud_client::{ApiClient, GcloudError};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zonal_common::{CellValue, Column, FieldType, Table};

use crate::error::{WarehouseError, WarehouseResult};
use crate::table_ref::{TableRef, WriteDisposition};
use crate::types::{
    Job, JobReference, LoadConfiguration, LoadJob, LoadJobConfiguration, QueryRequest,
    QueryResponse, TableFieldSchema, TableReference, TableRow, TableSchema,
};
use crate::Warehouse;

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

/// BigQuery client settings.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// API root, overridable for testing
    pub endpoint: String,
    /// Job location (e.g. "US", "EU"); BigQuery infers it when unset
    pub location: Option<String>,
    /// Rows requested per result page
    pub page_size: u32,
    /// Server-side wait per query/results call
    pub query_wait: Duration,
    /// Pause between polls of a running job
    pub poll_interval: Duration,
    /// Give up on a query or load job after this long
    pub job_timeout: Duration,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            location: None,
            page_size: 10_000,
            query_wait: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
        }
    }
}

pub struct BigQueryClient {
    api: ApiClient,
    config: BigQueryConfig,
}

impl BigQueryClient {
    pub fn new(api: ApiClient, config: BigQueryConfig) -> Self {
        Self { api, config }
    }

    fn api_url(&self, project_id: &str, path: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            project_id,
            path
        )
    }

    fn upload_url(&self, project_id: &str) -> String {
        format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.config.endpoint.trim_end_matches('/'),
            project_id
        )
    }

    fn job_location<'a>(&'a self, job: &'a JobReference) -> Option<&'a str> {
        job.location.as_deref().or(self.config.location.as_deref())
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> WarehouseResult<QueryResponse> {
        let url = self.api_url(&job.project_id, &format!("queries/{}", job.job_id));
        let mut params = vec![
            ("timeoutMs", self.config.query_wait.as_millis().to_string()),
            ("maxResults", self.config.page_size.to_string()),
        ];
        if let Some(location) = self.job_location(job) {
            params.push(("location", location.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        debug!(job_id = %job.job_id, page_token = ?page_token, "Fetching query results");
        let response = self
            .api
            .send_json("bigquery getQueryResults", |http| {
                http.get(&url).query(&params)
            })
            .await?;
        Ok(response)
    }

    async fn wait_for_job(&self, job: &JobReference) -> WarehouseResult<()> {
        let url = self.api_url(&job.project_id, &format!("jobs/{}", job.job_id));
        let location = self.job_location(job).map(str::to_string);
        let deadline = Instant::now() + self.config.job_timeout;

        loop {
            let current: Job = self
                .api
                .send_json("bigquery jobs.get", |http| {
                    let request = http.get(&url);
                    match &location {
                        Some(location) => request.query(&[("location", location)]),
                        None => request,
                    }
                })
                .await?;

            if let Some(status) = current.status.filter(|s| s.is_done()) {
                return match status.error_message() {
                    Some(message) => Err(WarehouseError::JobFailed {
                        job_id: job.job_id.clone(),
                        message,
                    }),
                    None => Ok(()),
                };
            }

            if Instant::now() >= deadline {
                return Err(WarehouseError::Timeout {
                    job_id: job.job_id.clone(),
                    timeout: self.config.job_timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    #[instrument(skip(self, sql), fields(sql_len = sql.len()))]
    async fn query(&self, project_id: &str, sql: &str) -> WarehouseResult<Table> {
        let url = self.api_url(project_id, "queries");
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.config.query_wait.as_millis() as u64,
            max_results: self.config.page_size,
            location: self.config.location.as_deref(),
            request_id: Uuid::new_v4().to_string(),
        };

        let mut response: QueryResponse = self
            .api
            .send_json("bigquery query", |http| http.post(&url).json(&request))
            .await?;

        let job = response.job_reference.clone().ok_or_else(|| {
            WarehouseError::UnexpectedResponse("query response has no jobReference".to_string())
        })?;
        info!(job_id = %job.job_id, "Query submitted");

        let deadline = Instant::now() + self.config.job_timeout;
        while !response.job_complete {
            if Instant::now() >= deadline {
                return Err(WarehouseError::Timeout {
                    job_id: job.job_id.clone(),
                    timeout: self.config.job_timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
            response = self.query_results(&job, None).await?;
        }

        let schema = response.schema.take().ok_or_else(|| {
            WarehouseError::UnexpectedResponse("completed query has no schema".to_string())
        })?;
        let mut table = Table::new(schema.fields.iter().map(to_column).collect());
        append_rows(&mut table, &schema.fields, std::mem::take(&mut response.rows))?;

        let mut pages = 1;
        while let Some(token) = response.page_token.take() {
            response = self.query_results(&job, Some(&token)).await?;
            append_rows(&mut table, &schema.fields, std::mem::take(&mut response.rows))?;
            pages += 1;
        }

        info!(
            job_id = %job.job_id,
            rows = table.len(),
            columns = table.columns.len(),
            pages = pages,
            "Query complete"
        );
        Ok(table)
    }

    #[instrument(skip(self, destination, table), fields(destination = %destination, rows = table.len()))]
    async fn write_table(
        &self,
        destination: &TableRef,
        table: &Table,
        disposition: WriteDisposition,
    ) -> WarehouseResult<()> {
        let job_ref = JobReference {
            project_id: destination.project_id.clone(),
            job_id: format!("zonal_stats_load_{}", Uuid::new_v4().simple()),
            location: self.config.location.clone(),
        };
        let metadata = LoadJob {
            job_reference: job_ref.clone(),
            configuration: LoadJobConfiguration {
                load: LoadConfiguration {
                    destination_table: TableReference {
                        project_id: destination.project_id.clone(),
                        dataset_id: destination.dataset_id.clone(),
                        table_id: destination.table_id.clone(),
                    },
                    source_format: "NEWLINE_DELIMITED_JSON",
                    write_disposition: disposition.as_bigquery(),
                    create_disposition: "CREATE_IF_NEEDED",
                    schema: schema_for(table),
                },
            },
        };

        let boundary = format!("zonal_stats_{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &serde_json::to_string(&metadata)?, &to_ndjson(table)?);
        let content_type = format!("multipart/related; boundary={}", boundary);
        let url = self.upload_url(&destination.project_id);

        debug!(job_id = %job_ref.job_id, bytes = body.len(), disposition = ?disposition, "Uploading load job");
        let submitted: Result<Job, GcloudError> = self
            .api
            .send_json("bigquery load", |http| {
                http.post(&url)
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await;

        let job_ref = match submitted {
            Ok(job) => job.job_reference.unwrap_or(job_ref),
            // An earlier attempt reached BigQuery before its response was lost
            Err(e) if e.status() == Some(409) => {
                warn!(job_id = %job_ref.job_id, "Load job already exists, waiting on it");
                job_ref
            }
            Err(e) => return Err(e.into()),
        };
        info!(job_id = %job_ref.job_id, "Load job submitted");

        self.wait_for_job(&job_ref).await?;
        info!(job_id = %job_ref.job_id, "Load job complete");
        Ok(())
    }
}

fn to_column(field: &TableFieldSchema) -> Column {
    let field_type = if field.is_nested() {
        FieldType::Other(field.field_type.to_ascii_uppercase())
    } else {
        FieldType::from_type_name(&field.field_type)
    };
    Column::new(field.name.clone(), field_type)
}

fn append_rows(
    table: &mut Table,
    fields: &[TableFieldSchema],
    rows: Vec<TableRow>,
) -> WarehouseResult<()> {
    for row in rows {
        let cells = fields
            .iter()
            .zip(row.f)
            .map(|(field, cell)| convert_cell(field, cell.v))
            .collect::<WarehouseResult<Vec<_>>>()?;
        table.push_row(cells);
    }
    Ok(())
}

/// Type a raw result cell using its schema field.
///
/// Scalars arrive as JSON strings; nested values are kept as JSON text.
pub(crate) fn convert_cell(
    field: &TableFieldSchema,
    value: serde_json::Value,
) -> WarehouseResult<CellValue> {
    use serde_json::Value;

    let invalid = |message: String| WarehouseError::InvalidCell {
        column: field.name.clone(),
        message,
    };

    if value.is_null() {
        return Ok(CellValue::Null);
    }
    if field.is_nested() {
        return Ok(CellValue::String(value.to_string()));
    }

    let text = match value {
        Value::String(s) => s,
        Value::Bool(b) => return Ok(CellValue::Bool(b)),
        other => other.to_string(),
    };

    match FieldType::from_type_name(&field.field_type) {
        FieldType::Integer => text
            .parse::<i64>()
            .map(CellValue::Integer)
            .map_err(|e| invalid(format!("'{}' is not an integer: {}", text, e))),
        FieldType::Float => text
            .parse::<f64>()
            .map(CellValue::Float)
            .map_err(|e| invalid(format!("'{}' is not a number: {}", text, e))),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(CellValue::Bool(true)),
            "false" => Ok(CellValue::Bool(false)),
            _ => Err(invalid(format!("'{}' is not a boolean", text))),
        },
        _ => Ok(CellValue::String(text)),
    }
}

fn schema_for(table: &Table) -> TableSchema {
    TableSchema {
        fields: table
            .columns
            .iter()
            .map(|column| TableFieldSchema {
                name: column.name.clone(),
                field_type: column.field_type.type_name().to_string(),
                mode: Some("NULLABLE".to_string()),
                fields: Vec::new(),
            })
            .collect(),
    }
}

/// One JSON object per row, keyed by column name.
pub(crate) fn to_ndjson(table: &Table) -> WarehouseResult<String> {
    let mut out = String::new();
    for row in &table.rows {
        let object: serde_json::Map<String, serde_json::Value> = table
            .columns
            .iter()
            .zip(row)
            .map(|(column, cell)| (column.name.clone(), cell.to_json()))
            .collect();
        out.push_str(&serde_json::to_string(&object)?);
        out.push('\n');
    }
    Ok(out)
}

/// `multipart/related` body: JSON metadata, then the data part.
pub(crate) fn multipart_body(boundary: &str, metadata: &str, data: &str) -> Vec<u8> {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{b}\r\nContent-Type: application/octet-stream\r\n\r\n{data}\r\n\
         --{b}--\r\n",
        b = boundary,
        metadata = metadata,
        data = data,
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, field_type: &str) -> TableFieldSchema {
        TableFieldSchema {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: None,
            fields: Vec::new(),
        }
    }

    #[test]
    fn test_convert_scalars() {
        assert_eq!(
            convert_cell(&field("n", "INTEGER"), json!("42")).unwrap(),
            CellValue::Integer(42)
        );
        assert_eq!(
            convert_cell(&field("x", "FLOAT64"), json!("0.25")).unwrap(),
            CellValue::Float(0.25)
        );
        assert_eq!(
            convert_cell(&field("b", "BOOL"), json!("true")).unwrap(),
            CellValue::Bool(true)
        );
        assert_eq!(
            convert_cell(&field("geom", "GEOGRAPHY"), json!("POINT(1 2)")).unwrap(),
            CellValue::String("POINT(1 2)".to_string())
        );
        assert_eq!(
            convert_cell(&field("n", "INTEGER"), serde_json::Value::Null).unwrap(),
            CellValue::Null
        );
    }

    #[test]
    fn test_convert_non_finite_float() {
        match convert_cell(&field("x", "FLOAT"), json!("NaN")).unwrap() {
            CellValue::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_invalid_integer() {
        let err = convert_cell(&field("n", "INTEGER"), json!("abc")).unwrap_err();
        assert!(matches!(err, WarehouseError::InvalidCell { ref column, .. } if column == "n"));
    }

    #[test]
    fn test_convert_repeated_as_json_text() {
        let mut tags = field("tags", "STRING");
        tags.mode = Some("REPEATED".to_string());
        let value = json!([{"v": "a"}, {"v": "b"}]);
        assert_eq!(
            convert_cell(&tags, value.clone()).unwrap(),
            CellValue::String(value.to_string())
        );
    }

    #[test]
    fn test_ndjson() {
        let mut table = Table::new(vec![
            Column::new("NDVI_mean", FieldType::Float),
            Column::new("geometry", FieldType::Geography),
        ]);
        table.push_row(vec![CellValue::Float(0.5), CellValue::String("POINT (1 2)".into())]);
        table.push_row(vec![CellValue::Null, CellValue::String("POINT (3 4)".into())]);

        let ndjson = to_ndjson(&table).unwrap();
        let lines: Vec<serde_json::Value> = ndjson
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], json!({"NDVI_mean": 0.5, "geometry": "POINT (1 2)"}));
        assert_eq!(lines[1], json!({"NDVI_mean": null, "geometry": "POINT (3 4)"}));
    }

    #[test]
    fn test_multipart_body() {
        let body = String::from_utf8(multipart_body("xyz", "{\"a\":1}", "{\"b\":2}\n")).unwrap();
        assert!(body.starts_with("--xyz\r\nContent-Type: application/json"));
        assert!(body.contains("\r\n\r\n{\"a\":1}\r\n--xyz\r\n"));
        assert!(body.contains("application/octet-stream\r\n\r\n{\"b\":2}\n\r\n"));
        assert!(body.ends_with("--xyz--\r\n"));
    }
}
