//! Zonal statistics that can be computed per feature.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ZonalError;

/// A summary statistic reduced over the pixels inside a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "median")]
    Median,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "stdDev")]
    StdDev,
    #[serde(rename = "sum")]
    Sum,
}

impl Statistic {
    /// All statistics, in the default computation order.
    pub const ALL: [Statistic; 6] = [
        Statistic::Mean,
        Statistic::Median,
        Statistic::Max,
        Statistic::Min,
        Statistic::StdDev,
        Statistic::Sum,
    ];

    /// Canonical name, also used as the output column suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::StdDev => "stdDev",
            Statistic::Sum => "sum",
        }
    }

    /// Look up a statistic by name, ignoring case.
    ///
    /// `MEAN` resolves to `Mean` rather than counting as an unknown name
    /// that falls back to `Sum`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }

    /// Resolve a list of names.
    ///
    /// Unknown names resolve to `Sum` and are returned alongside so the
    /// caller can report them. Duplicates keep their first position.
    pub fn resolve_list<S: AsRef<str>>(names: &[S]) -> (Vec<Statistic>, Vec<String>) {
        let mut stats = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            let stat = Self::from_name(name).unwrap_or_else(|| {
                unknown.push(name.to_string());
                Statistic::Sum
            });
            if !stats.contains(&stat) {
                stats.push(stat);
            }
        }
        (stats, unknown)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = ZonalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            ZonalError::invalid_parameter(
                "statistic",
                format!("unknown statistic '{}' (expected one of mean, median, max, min, stdDev, sum)", s),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Statistic::from_name("stdDev"), Some(Statistic::StdDev));
        assert_eq!(Statistic::from_name("STDDEV"), Some(Statistic::StdDev));
        assert_eq!(Statistic::from_name(" mean "), Some(Statistic::Mean));
        assert_eq!(Statistic::from_name("variance"), None);
    }

    #[test]
    fn test_resolve_list_falls_back_to_sum() {
        let (stats, unknown) = Statistic::resolve_list(&["mean", "mode", "max"]);
        assert_eq!(stats, vec![Statistic::Mean, Statistic::Sum, Statistic::Max]);
        assert_eq!(unknown, vec!["mode".to_string()]);
    }

    #[test]
    fn test_resolve_list_uppercase_is_known() {
        let (stats, unknown) = Statistic::resolve_list(&["MEAN", "Max"]);
        assert_eq!(stats, vec![Statistic::Mean, Statistic::Max]);
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_resolve_list_dedupes() {
        let (stats, _) = Statistic::resolve_list(&["sum", "mean", "Mean", "bogus"]);
        assert_eq!(stats, vec![Statistic::Sum, Statistic::Mean]);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Statistic::StdDev).unwrap();
        assert_eq!(json, "\"stdDev\"");
        let s: Statistic = serde_json::from_str("\"median\"").unwrap();
        assert_eq!(s, Statistic::Median);
    }

    #[test]
    fn test_from_str_strict() {
        assert!("mode".parse::<Statistic>().is_err());
        assert_eq!("min".parse::<Statistic>().unwrap(), Statistic::Min);
    }
}
