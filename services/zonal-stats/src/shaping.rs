//! Shaping per-statistic values into the output table.

use zonal_common::wkt::to_wkt;
use zonal_common::{BandCalc, CellValue, Column, FieldType, Geometry, Statistic, Table};

/// Name of the output column holding each input geometry.
pub const OUTPUT_GEOMETRY_COLUMN: &str = "geometry";

/// One statistic's values, indexed by input row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticValues {
    pub statistic: Statistic,
    pub values: Vec<Option<f64>>,
}

impl StatisticValues {
    pub fn new(statistic: Statistic, rows: usize) -> Self {
        Self {
            statistic,
            values: vec![None; rows],
        }
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Output columns: one FLOAT per statistic in order, then the geometry.
pub fn output_columns(band_calc: &BandCalc, statistics: &[StatisticValues]) -> Vec<Column> {
    statistics
        .iter()
        .map(|s| Column::new(band_calc.column_name(s.statistic), FieldType::Float))
        .chain(std::iter::once(Column::new(
            OUTPUT_GEOMETRY_COLUMN,
            FieldType::Geography,
        )))
        .collect()
}

/// Build the output table, one row per input geometry in input order.
pub fn output_table(
    band_calc: &BandCalc,
    statistics: &[StatisticValues],
    geometries: &[Geometry],
) -> Table {
    let mut table = Table::new(output_columns(band_calc, statistics));
    for (row, geometry) in geometries.iter().enumerate() {
        let mut cells: Vec<CellValue> = statistics
            .iter()
            .map(|s| CellValue::from(s.values.get(row).copied().flatten()))
            .collect();
        cells.push(CellValue::String(to_wkt(geometry)));
        table.push_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_table() {
        let geometries = vec![Geometry::point(1.0, 2.0), Geometry::point(3.5, -4.0)];
        let mut mean = StatisticValues::new(Statistic::Mean, 2);
        mean.values[0] = Some(0.5);
        let mut max = StatisticValues::new(Statistic::Max, 2);
        max.values = vec![Some(0.9), Some(0.7)];

        let table = output_table(&BandCalc::default(), &[mean, max], &geometries);

        assert_eq!(table.column_names(), vec!["NDVI_mean", "NDVI_max", "geometry"]);
        assert_eq!(table.columns[0].field_type, FieldType::Float);
        assert_eq!(table.columns[2].field_type, FieldType::Geography);
        assert_eq!(
            table.rows[0],
            vec![
                CellValue::Float(0.5),
                CellValue::Float(0.9),
                CellValue::String("POINT (1 2)".to_string())
            ]
        );
        assert_eq!(table.rows[1][0], CellValue::Null);
        assert_eq!(table.rows[1][2], CellValue::String("POINT (3.5 -4)".to_string()));
    }

    #[test]
    fn test_null_count() {
        let mut values = StatisticValues::new(Statistic::Sum, 3);
        values.values[1] = Some(12.0);
        assert_eq!(values.null_count(), 2);
    }
}
