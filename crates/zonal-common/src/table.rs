//! Tabular rows flowing between the warehouse and the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{ZonalError, ZonalResult};
use crate::geometry::Geometry;
use crate::wkt::parse_wkt;

/// Column names recognised as the geometry column, compared lower-cased.
pub const GEOMETRY_COLUMN_NAMES: [&str; 3] = ["geometry", "geography", "geom"];

/// Warehouse column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Geography,
    Timestamp,
    /// Any other type name, carried verbatim.
    Other(String),
}

impl FieldType {
    /// Map a warehouse type name (legacy or standard SQL) to a field type.
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => FieldType::String,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => FieldType::Float,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "GEOGRAPHY" => FieldType::Geography,
            "TIMESTAMP" => FieldType::Timestamp,
            other => FieldType::Other(other.to_string()),
        }
    }

    /// Warehouse type name used when declaring a schema.
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Other(name) => name,
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// JSON form used in load payloads. Non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map(CellValue::Float).unwrap_or(CellValue::Null)
    }
}

/// An ordered set of columns and rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with nulls.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Fail if the table has no rows.
    pub fn ensure_not_empty(&self) -> ZonalResult<()> {
        if self.is_empty() {
            return Err(ZonalError::EmptyTable);
        }
        Ok(())
    }

    /// Index of the first column whose lower-cased name is a geometry name.
    pub fn geometry_column(&self) -> ZonalResult<usize> {
        self.columns
            .iter()
            .position(|c| GEOMETRY_COLUMN_NAMES.contains(&c.name.to_lowercase().as_str()))
            .ok_or_else(|| ZonalError::MissingGeometryColumn {
                expected: GEOMETRY_COLUMN_NAMES.join(", "),
                found: self.column_names().join(", "),
            })
    }

    /// Parse every cell of a column as WKT.
    pub fn geometries(&self, column: usize) -> ZonalResult<Vec<Geometry>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| match cells.get(column) {
                Some(CellValue::String(wkt)) => {
                    parse_wkt(wkt).map_err(|source| ZonalError::InvalidGeometry { row, source })
                }
                Some(CellValue::Null) | None => Err(ZonalError::NullGeometry(row)),
                Some(other) => Err(ZonalError::InvalidGeometry {
                    row,
                    source: crate::wkt::WktError::InvalidWkt(format!(
                        "expected WKT text, got {:?}",
                        other
                    )),
                }),
            })
            .collect()
    }
}
