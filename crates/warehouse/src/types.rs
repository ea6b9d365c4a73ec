//! BigQuery v2 REST request and response bodies.
//!
//! Only the fields this crate reads or sends are modelled.

use serde::{Deserialize, Serialize};

/// Body of `jobs.query`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub query: &'a str,
    pub use_legacy_sql: bool,
    pub timeout_ms: u64,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<&'a str>,
    /// Lets BigQuery deduplicate a retried submission
    pub request_id: String,
}

/// Reply of `jobs.query` and `jobs.getQueryResults`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_complete: bool,
    pub job_reference: Option<JobReference>,
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub page_token: Option<String>,
    pub total_rows: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    /// Whether values of this field arrive as nested JSON rather than a scalar.
    pub fn is_nested(&self) -> bool {
        let repeated = self
            .mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("REPEATED"));
        let record = matches!(
            self.field_type.to_ascii_uppercase().as_str(),
            "RECORD" | "STRUCT"
        );
        repeated || record
    }
}

/// A result row: `{"f": [{"v": ...}, ...]}`.
#[derive(Debug, Default, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

/// A job resource, as returned by `jobs.insert` and `jobs.get`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: Option<JobReference>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.state.eq_ignore_ascii_case("DONE")
    }

    /// All error messages, the primary one first.
    pub fn error_message(&self) -> Option<String> {
        let primary = self.error_result.as_ref()?;
        let mut messages = vec![primary.describe()];
        for error in &self.errors {
            let described = error.describe();
            if !messages.contains(&described) {
                messages.push(described);
            }
        }
        Some(messages.join("; "))
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorProto {
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Metadata part of a multipart `jobs.insert` upload.
///
/// The job id is chosen client-side so a retried upload names the same job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJob {
    pub job_reference: JobReference,
    pub configuration: LoadJobConfiguration,
}

#[derive(Debug, Serialize)]
pub struct LoadJobConfiguration {
    pub load: LoadConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfiguration {
    pub destination_table: TableReference,
    pub source_format: &'static str,
    pub write_disposition: &'static str,
    pub create_disposition: &'static str,
    pub schema: TableSchema,
}
