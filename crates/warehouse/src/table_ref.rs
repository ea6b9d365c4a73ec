//! Destination table references and write dispositions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WarehouseError;

/// A fully qualified table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    /// Parse `dataset.table`, `project.dataset.table` or `project:dataset.table`.
    ///
    /// `default_project` fills in a missing project.
    pub fn parse(s: &str, default_project: &str) -> Result<Self, WarehouseError> {
        let invalid = || WarehouseError::InvalidTableRef(s.to_string());
        let s = s.trim();

        let (project, rest) = match s.split_once(':') {
            Some((project, rest)) => (Some(project), rest),
            None => (None, s),
        };

        let parts: Vec<&str> = rest.split('.').collect();
        let (project, dataset, table) = match (project, parts.as_slice()) {
            (Some(p), [d, t]) => (p, *d, *t),
            (None, [d, t]) => (default_project, *d, *t),
            (None, [p, d, t]) => (*p, *d, *t),
            _ => return Err(invalid()),
        };

        let valid = |part: &str| !part.is_empty() && !part.contains(char::is_whitespace);
        if !valid(project) || !valid(dataset) || !valid(table) {
            return Err(invalid());
        }

        Ok(Self {
            project_id: project.to_string(),
            dataset_id: dataset.to_string(),
            table_id: table.to_string(),
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// What to do when the destination table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    /// Drop existing rows and schema
    #[default]
    Replace,
    /// Add rows to the existing table
    Append,
    /// Refuse to write into a non-empty table
    Fail,
}

impl WriteDisposition {
    /// BigQuery `writeDisposition` value.
    pub fn as_bigquery(&self) -> &'static str {
        match self {
            WriteDisposition::Replace => "WRITE_TRUNCATE",
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Fail => "WRITE_EMPTY",
        }
    }
}

impl FromStr for WriteDisposition {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(WriteDisposition::Replace),
            "append" => Ok(WriteDisposition::Append),
            "fail" => Ok(WriteDisposition::Fail),
            _ => Err(WarehouseError::InvalidDisposition(s.to_string())),
        }
    }
}
