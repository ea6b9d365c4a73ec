//! Normalized-difference band calculation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ZonalError, ZonalResult};
use crate::statistic::Statistic;

/// A named normalized difference `(first - second) / (first + second)`.
///
/// For NDVI the first band is near-infrared and the second is red.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCalc {
    pub name: String,
    pub nir_band: String,
    pub red_band: String,
}

impl Default for BandCalc {
    fn default() -> Self {
        Self::ndvi("B8", "B4")
    }
}

impl BandCalc {
    /// NDVI from the given near-infrared and red bands.
    pub fn ndvi(nir_band: impl Into<String>, red_band: impl Into<String>) -> Self {
        Self {
            name: "NDVI".to_string(),
            nir_band: nir_band.into(),
            red_band: red_band.into(),
        }
    }

    /// Check the name is usable as a column prefix and bands are named.
    pub fn validate(&self) -> ZonalResult<()> {
        let mut chars = self.name.chars();
        let valid_start = chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ZonalError::InvalidBandCalc(format!(
                "'{}' is not a valid column name",
                self.name
            )));
        }
        if self.nir_band.trim().is_empty() || self.red_band.trim().is_empty() {
            return Err(ZonalError::InvalidBandCalc(
                "both band names are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Band pair in the order the normalized difference expects.
    pub fn bands(&self) -> [&str; 2] {
        [&self.nir_band, &self.red_band]
    }

    /// Output column for a statistic, e.g. `NDVI_mean`.
    pub fn column_name(&self, statistic: Statistic) -> String {
        format!("{}_{}", self.name, statistic.as_str())
    }
}

impl fmt::Display for BandCalc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.name, self.nir_band, self.red_band)
    }
}

impl FromStr for BandCalc {
    type Err = ZonalError;

    /// Parse `NAME:NIR,RED`, e.g. `NDVI: B8, B4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, bands) = s.split_once(':').ok_or_else(|| {
            ZonalError::InvalidBandCalc(format!("expected NAME:NIR,RED, got '{}'", s))
        })?;
        let parts: Vec<&str> = bands.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(ZonalError::InvalidBandCalc(format!(
                "expected exactly two bands, got '{}'",
                bands.trim()
            )));
        }

        let calc = BandCalc {
            name: name.trim().to_string(),
            nir_band: parts[0].to_string(),
            red_band: parts[1].to_string(),
        };
        calc.validate()?;
        Ok(calc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ndvi() {
        let calc = BandCalc::default();
        assert_eq!(calc.name, "NDVI");
        assert_eq!(calc.bands(), ["B8", "B4"]);
    }

    #[test]
    fn test_parse() {
        let calc: BandCalc = "NDVI: B8, B4".parse().unwrap();
        assert_eq!(calc, BandCalc::ndvi("B8", "B4"));

        let calc: BandCalc = "NDWI:B3,B8".parse().unwrap();
        assert_eq!(calc.name, "NDWI");
        assert_eq!(calc.to_string(), "NDWI:B3,B8");
    }

    #[test]
    fn test_parse_errors() {
        assert!("NDVI".parse::<BandCalc>().is_err());
        assert!("NDVI:B8".parse::<BandCalc>().is_err());
        assert!("NDVI:B8,B4,B2".parse::<BandCalc>().is_err());
        assert!("1NDVI:B8,B4".parse::<BandCalc>().is_err());
        assert!("ND-VI:B8,B4".parse::<BandCalc>().is_err());
        assert!("NDVI:B8, ".parse::<BandCalc>().is_err());
    }

    #[test]
    fn test_column_name() {
        let calc = BandCalc::default();
        assert_eq!(calc.column_name(Statistic::StdDev), "NDVI_stdDev");
    }
}
