//! Job configuration.
//!
//! Settings come from an optional YAML job file and from the command line;
//! command-line values win. [`JobFile::validate`] turns the merged settings
//! into a [`ZonalStatsJob`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gcloud_client::{ClientConfig, RetryPolicy};
use serde::Deserialize;
use tracing::{debug, warn};
use warehouse::{TableRef, WriteDisposition};
use zonal_common::{BandCalc, DateRange, Statistic, ZonalError};

/// Features sent per compute request unless configured.
pub const DEFAULT_MAX_FEATURES_PER_REQUEST: usize = 500;

/// Reduction scale in metres unless configured.
pub const DEFAULT_SCALE: f64 = 10.0;

/// Job file layout. Every field is optional so the file can be partial.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub imagery: ImagerySection,
    /// Statistic names; unknown names fall back to `sum`
    #[serde(default)]
    pub statistics: Option<Vec<String>>,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub compute: ComputeSection,
    #[serde(default)]
    pub endpoints: EndpointsSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsSection {
    /// Service-account e-mail used as the token issuer
    pub service_account: Option<String>,
    /// Path to the service-account JSON key
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSection {
    /// Project billed for the query
    pub project_id: Option<String>,
    pub sql: Option<String>,
    /// File holding the query, as an alternative to `sql`
    pub sql_file: Option<PathBuf>,
    /// Warehouse job location
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagerySection {
    /// Image collection ID
    pub collection: Option<String>,
    /// Inclusive start date
    pub start_date: Option<String>,
    /// Exclusive end date
    pub end_date: Option<String>,
    pub band_calc: Option<BandCalcSetting>,
    /// Reduction scale in metres
    pub scale: Option<f64>,
}

/// A band calculation, either `"NDVI:B8,B4"` or `{NDVI: [B8, B4]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BandCalcSetting {
    Text(String),
    Mapping(BTreeMap<String, Vec<String>>),
}

impl BandCalcSetting {
    pub fn to_band_calc(&self) -> Result<BandCalc, ZonalError> {
        let calc = match self {
            BandCalcSetting::Text(text) => text.parse::<BandCalc>()?,
            BandCalcSetting::Mapping(map) => {
                let mut entries = map.iter();
                match (entries.next(), entries.next()) {
                    (Some((name, bands)), None) => match bands.as_slice() {
                        [nir, red] => BandCalc {
                            name: name.clone(),
                            nir_band: nir.clone(),
                            red_band: red.clone(),
                        },
                        _ => {
                            return Err(ZonalError::InvalidBandCalc(format!(
                                "'{}' needs exactly two bands, got {}",
                                name,
                                bands.len()
                            )))
                        }
                    },
                    _ => {
                        return Err(ZonalError::InvalidBandCalc(
                            "exactly one band calculation is supported".to_string(),
                        ))
                    }
                }
            }
        };
        calc.validate()?;
        Ok(calc)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    /// `dataset.table` or `project.dataset.table`
    pub table: Option<String>,
    /// Project for tables given without one; defaults to the source project
    pub project_id: Option<String>,
    /// `replace`, `append` or `fail`
    pub if_exists: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputeSection {
    /// Project billed for compute; defaults to the source project
    pub project_id: Option<String>,
    pub max_features_per_request: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsSection {
    pub bigquery: Option<String>,
    pub earth_engine: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpSection {
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_retry_delay_ms: Option<u64>,
}

/// Service-account settings for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub service_account: Option<String>,
    pub key_file: PathBuf,
}

/// API roots for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub bigquery: String,
    pub earth_engine: String,
}

/// A validated job.
#[derive(Debug, Clone)]
pub struct ZonalStatsJob {
    pub credentials: Credentials,
    pub source_project: String,
    pub sql: String,
    pub location: Option<String>,
    pub collection: String,
    pub date_range: DateRange,
    pub band_calc: BandCalc,
    pub statistics: Vec<Statistic>,
    pub scale: f64,
    pub output: TableRef,
    pub disposition: WriteDisposition,
    pub compute_project: String,
    pub max_features_per_request: usize,
    pub endpoints: Endpoints,
    pub http: ClientConfig,
}

fn required<T>(value: Option<T>, param: &str) -> Result<T, ZonalError> {
    value.ok_or_else(|| ZonalError::invalid_parameter(param, "is required"))
}

/// Trimmed, non-empty text.
fn text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl JobFile {
    /// Load a job file from YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;

        let job: JobFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse job file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded job file");
        Ok(job)
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: JobFile) -> JobFile {
        JobFile {
            credentials: CredentialsSection {
                service_account: other.credentials.service_account.or(self.credentials.service_account),
                key_file: other.credentials.key_file.or(self.credentials.key_file),
            },
            source: SourceSection {
                project_id: other.source.project_id.or(self.source.project_id),
                // an inline query and a query file from different layers must not both survive
                sql: match (&other.source.sql, &other.source.sql_file) {
                    (None, None) => self.source.sql.clone(),
                    _ => other.source.sql.clone(),
                },
                sql_file: match (&other.source.sql, &other.source.sql_file) {
                    (None, None) => self.source.sql_file.clone(),
                    _ => other.source.sql_file.clone(),
                },
                location: other.source.location.or(self.source.location),
            },
            imagery: ImagerySection {
                collection: other.imagery.collection.or(self.imagery.collection),
                start_date: other.imagery.start_date.or(self.imagery.start_date),
                end_date: other.imagery.end_date.or(self.imagery.end_date),
                band_calc: other.imagery.band_calc.or(self.imagery.band_calc),
                scale: other.imagery.scale.or(self.imagery.scale),
            },
            statistics: other.statistics.or(self.statistics),
            output: OutputSection {
                table: other.output.table.or(self.output.table),
                project_id: other.output.project_id.or(self.output.project_id),
                if_exists: other.output.if_exists.or(self.output.if_exists),
            },
            compute: ComputeSection {
                project_id: other.compute.project_id.or(self.compute.project_id),
                max_features_per_request: other
                    .compute
                    .max_features_per_request
                    .or(self.compute.max_features_per_request),
            },
            endpoints: EndpointsSection {
                bigquery: other.endpoints.bigquery.or(self.endpoints.bigquery),
                earth_engine: other.endpoints.earth_engine.or(self.endpoints.earth_engine),
            },
            http: HttpSection {
                request_timeout_secs: other.http.request_timeout_secs.or(self.http.request_timeout_secs),
                connect_timeout_secs: other.http.connect_timeout_secs.or(self.http.connect_timeout_secs),
                max_retries: other.http.max_retries.or(self.http.max_retries),
                initial_retry_delay_ms: other
                    .http
                    .initial_retry_delay_ms
                    .or(self.http.initial_retry_delay_ms),
            },
        }
    }

    /// Check every setting and apply defaults.
    ///
    /// Relative `sql_file` paths are resolved against `base_dir`.
    pub fn validate(self, base_dir: &Path) -> Result<ZonalStatsJob> {
        let credentials = Credentials {
            service_account: text(self.credentials.service_account),
            key_file: required(self.credentials.key_file, "credentials.key_file")?,
        };

        let source_project = required(text(self.source.project_id), "source.project_id")?;

        let sql = match (text(self.source.sql), self.source.sql_file) {
            (Some(_), Some(_)) => {
                return Err(ZonalError::invalid_parameter(
                    "source.sql",
                    "give either sql or sql_file, not both",
                )
                .into())
            }
            (Some(sql), None) => sql,
            (None, Some(file)) => {
                let path = base_dir.join(file);
                let sql = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read SQL file: {}", path.display()))?;
                required(text(Some(sql)), "source.sql_file")?
            }
            (None, None) => return Err(ZonalError::invalid_parameter("source.sql", "is required").into()),
        };

        let collection = required(text(self.imagery.collection), "imagery.collection")?;
        let start = required(text(self.imagery.start_date), "imagery.start_date")?;
        let end = required(text(self.imagery.end_date), "imagery.end_date")?;
        let date_range = DateRange::parse(&start, &end)?;

        let band_calc = match self.imagery.band_calc {
            Some(setting) => setting.to_band_calc()?,
            None => BandCalc::default(),
        };

        let scale = self.imagery.scale.unwrap_or(DEFAULT_SCALE);
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ZonalError::invalid_parameter(
                "imagery.scale",
                format!("must be a positive number of metres, got {}", scale),
            )
            .into());
        }

        let statistics = match self.statistics {
            Some(names) if !names.is_empty() => {
                let (statistics, unknown) = Statistic::resolve_list(&names);
                for name in &unknown {
                    warn!(statistic = %name, "Unknown statistic, using sum");
                }
                statistics
            }
            Some(_) => {
                return Err(
                    ZonalError::invalid_parameter("statistics", "at least one is required").into(),
                )
            }
            None => Statistic::ALL.to_vec(),
        };

        let output_project = text(self.output.project_id).unwrap_or_else(|| source_project.clone());
        let table = required(text(self.output.table), "output.table")?;
        let output = TableRef::parse(&table, &output_project)
            .map_err(|e| ZonalError::invalid_parameter("output.table", e.to_string()))?;

        let disposition = match text(self.output.if_exists) {
            Some(value) => value
                .parse::<WriteDisposition>()
                .map_err(|e| ZonalError::invalid_parameter("output.if_exists", e.to_string()))?,
            None => WriteDisposition::default(),
        };

        let compute_project = text(self.compute.project_id).unwrap_or_else(|| source_project.clone());
        let max_features_per_request = self
            .compute
            .max_features_per_request
            .unwrap_or(DEFAULT_MAX_FEATURES_PER_REQUEST);
        if max_features_per_request == 0 {
            return Err(ZonalError::invalid_parameter(
                "compute.max_features_per_request",
                "must be at least 1",
            )
            .into());
        }

        let endpoints = Endpoints {
            bigquery: text(self.endpoints.bigquery)
                .unwrap_or_else(|| warehouse::bigquery::DEFAULT_ENDPOINT.to_string()),
            earth_engine: text(self.endpoints.earth_engine)
                .unwrap_or_else(|| earth_compute::client::DEFAULT_ENDPOINT.to_string()),
        };

        let defaults = ClientConfig::default();
        let http = ClientConfig {
            request_timeout: self
                .http
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: self
                .http
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            retry: RetryPolicy {
                max_retries: self.http.max_retries.unwrap_or(defaults.retry.max_retries),
                initial_delay: self
                    .http
                    .initial_retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.initial_delay),
                max_delay: defaults.retry.max_delay,
            },
        };

        Ok(ZonalStatsJob {
            credentials,
            source_project,
            sql,
            location: text(self.source.location),
            collection,
            date_range,
            band_calc,
            statistics,
            scale,
            output,
            disposition,
            compute_project,
            max_features_per_request,
            endpoints,
            http,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_YAML: &str = r#"
credentials:
  service_account: zonal-stats@test-project.iam.gserviceaccount.com
  key_file: /secrets/key.json

source:
  project_id: farm-data
  sql: SELECT field_id, geom FROM fields.boundaries

imagery:
  collection: COPERNICUS/S2_SR_HARMONIZED
  start_date: "2023-06-01"
  end_date: "2023-09-01"
  band_calc:
    NDVI: [B8, B4]
  scale: 20

statistics: [mean, max]

output:
  table: results.field_ndvi
"#;

    fn parse(yaml: &str) -> JobFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn param_of(err: anyhow::Error) -> String {
        match err.downcast_ref::<ZonalError>() {
            Some(ZonalError::InvalidParameter { param, .. }) => param.clone(),
            other => panic!("expected InvalidParameter, got {:?} ({})", other, err),
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let job = parse(JOB_YAML).validate(Path::new(".")).unwrap();

        assert_eq!(job.source_project, "farm-data");
        assert_eq!(job.compute_project, "farm-data");
        assert_eq!(job.output.to_string(), "farm-data.results.field_ndvi");
        assert_eq!(job.disposition, WriteDisposition::Replace);
        assert_eq!(job.statistics, vec![Statistic::Mean, Statistic::Max]);
        assert_eq!(job.band_calc, BandCalc::ndvi("B8", "B4"));
        assert_eq!(job.scale, 20.0);
        assert_eq!(job.max_features_per_request, DEFAULT_MAX_FEATURES_PER_REQUEST);
        assert_eq!(job.endpoints.bigquery, "https://bigquery.googleapis.com");
        assert_eq!(job.http.retry.max_retries, 3);
    }

    #[test]
    fn test_missing_statistics_means_all() {
        let mut file = parse(JOB_YAML);
        file.statistics = None;
        let job = file.validate(Path::new(".")).unwrap();
        assert_eq!(job.statistics, Statistic::ALL.to_vec());
    }

    #[test]
    fn test_unknown_statistic_falls_back_to_sum() {
        let mut file = parse(JOB_YAML);
        file.statistics = Some(vec!["Mean".into(), "p90".into(), "sum".into()]);
        let job = file.validate(Path::new(".")).unwrap();
        assert_eq!(job.statistics, vec![Statistic::Mean, Statistic::Sum]);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = parse(JOB_YAML);
        let cli = JobFile {
            output: OutputSection {
                table: Some("other-project.results.t".into()),
                if_exists: Some("append".into()),
                ..OutputSection::default()
            },
            imagery: ImagerySection {
                band_calc: Some(BandCalcSetting::Text("GNDVI:B8,B3".into())),
                ..ImagerySection::default()
            },
            ..JobFile::default()
        };

        let job = file.merge(cli).validate(Path::new(".")).unwrap();

        assert_eq!(job.output.project_id, "other-project");
        assert_eq!(job.disposition, WriteDisposition::Append);
        assert_eq!(job.band_calc.name, "GNDVI");
        assert_eq!(job.band_calc.red_band, "B3");
        assert_eq!(job.collection, "COPERNICUS/S2_SR_HARMONIZED");
    }

    #[test]
    fn test_cli_sql_file_replaces_file_sql() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("query.sql"), "SELECT geom FROM t\n").unwrap();

        let cli = JobFile {
            source: SourceSection {
                sql_file: Some(PathBuf::from("query.sql")),
                ..SourceSection::default()
            },
            ..JobFile::default()
        };
        let job = parse(JOB_YAML).merge(cli).validate(dir.path()).unwrap();

        assert_eq!(job.sql, "SELECT geom FROM t");
    }

    #[test]
    fn test_missing_required_fields() {
        let mut file = parse(JOB_YAML);
        file.imagery.collection = Some("  ".into());
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "imagery.collection");

        let mut file = parse(JOB_YAML);
        file.credentials.key_file = None;
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "credentials.key_file");

        let mut file = parse(JOB_YAML);
        file.source.sql = None;
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "source.sql");
    }

    #[test]
    fn test_invalid_values() {
        let mut file = parse(JOB_YAML);
        file.imagery.scale = Some(0.0);
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "imagery.scale");

        let mut file = parse(JOB_YAML);
        file.output.if_exists = Some("overwrite".into());
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "output.if_exists");

        let mut file = parse(JOB_YAML);
        file.output.table = Some("just_a_table".into());
        assert_eq!(param_of(file.validate(Path::new(".")).unwrap_err()), "output.table");

        let mut file = parse(JOB_YAML);
        file.compute.max_features_per_request = Some(0);
        assert_eq!(
            param_of(file.validate(Path::new(".")).unwrap_err()),
            "compute.max_features_per_request"
        );
    }

    #[test]
    fn test_date_range_must_be_ordered() {
        let mut file = parse(JOB_YAML);
        file.imagery.end_date = Some("2023-05-01".into());
        let err = file.validate(Path::new(".")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZonalError>(),
            Some(ZonalError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn test_band_calc_mapping_needs_two_bands() {
        let setting = BandCalcSetting::Mapping(BTreeMap::from([(
            "NDVI".to_string(),
            vec!["B8".to_string()],
        )]));
        assert!(matches!(setting.to_band_calc(), Err(ZonalError::InvalidBandCalc(_))));

        let text = BandCalcSetting::Text("NDWI: B3, B8".to_string());
        assert_eq!(text.to_band_calc().unwrap(), BandCalc {
            name: "NDWI".into(),
            nir_band: "B3".into(),
            red_band: "B8".into(),
        });
    }

    #[test]
    fn test_load_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, JOB_YAML).unwrap();

        let file = JobFile::load(&path).unwrap();
        assert_eq!(file.source.project_id.as_deref(), Some("farm-data"));
        assert_eq!(
            file.imagery.band_calc,
            Some(BandCalcSetting::Mapping(BTreeMap::from([(
                "NDVI".to_string(),
                vec!["B8".to_string(), "B4".to_string()]
            )])))
        );

        assert!(JobFile::load(&dir.path().join("missing.yaml")).is_err());
    }
}
