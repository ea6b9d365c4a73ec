//! Zonal statistics job runner.
//!
//! Runs a warehouse query, reduces Earth Engine imagery over every returned
//! geometry for each requested statistic and writes one result table.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use earth_compute::{EarthEngineClient, EarthEngineConfig};
use gcloud_client::{scopes, ApiClient, ServiceAccountKey, ServiceAccountTokenSource, TokenSource};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use warehouse::{BigQueryClient, BigQueryConfig};

use zonal_stats::config::{
    BandCalcSetting, ComputeSection, CredentialsSection, EndpointsSection, HttpSection,
    ImagerySection, OutputSection, SourceSection,
};
use zonal_stats::{JobFile, Pipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "zonal-stats")]
#[command(about = "Per-feature zonal statistics from BigQuery geometries over Earth Engine imagery")]
struct Args {
    /// YAML job file; flags below override its values
    #[arg(short, long, env = "ZONAL_STATS_CONFIG")]
    config: Option<PathBuf>,

    /// Service-account e-mail used as the token issuer
    #[arg(long, env = "ZONAL_STATS_SERVICE_ACCOUNT")]
    service_account: Option<String>,

    /// Service-account JSON key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    key_file: Option<PathBuf>,

    /// Project billed for the query
    #[arg(long, env = "BIGQUERY_PROJECT_ID")]
    project_id: Option<String>,

    /// Standard SQL returning a geometry, geography or geom column
    #[arg(long, conflicts_with = "sql_file")]
    sql: Option<String>,

    /// File holding the query
    #[arg(long)]
    sql_file: Option<PathBuf>,

    /// BigQuery job location (e.g. US, EU)
    #[arg(long, env = "BIGQUERY_LOCATION")]
    location: Option<String>,

    /// Earth Engine image collection ID
    #[arg(long)]
    collection: Option<String>,

    /// Start date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// End date, exclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Band calculation as NAME:NIR,RED
    #[arg(long)]
    band_calc: Option<String>,

    /// Statistics to compute (mean, median, max, min, stdDev, sum)
    #[arg(long, value_delimiter = ',')]
    stats: Option<Vec<String>>,

    /// Reduction scale in metres
    #[arg(long)]
    scale: Option<f64>,

    /// Output table (dataset.table or project.dataset.table)
    #[arg(long)]
    output_table: Option<String>,

    /// Project for output tables given without one
    #[arg(long)]
    output_project: Option<String>,

    /// What to do if the output table exists: replace, append or fail
    #[arg(long)]
    if_exists: Option<String>,

    /// Project billed for Earth Engine compute
    #[arg(long, env = "EARTH_ENGINE_PROJECT_ID")]
    compute_project: Option<String>,

    /// Maximum features per compute request
    #[arg(long)]
    max_features_per_request: Option<usize>,

    /// BigQuery API root
    #[arg(long, env = "BIGQUERY_ENDPOINT")]
    bigquery_endpoint: Option<String>,

    /// Earth Engine API root
    #[arg(long, env = "EARTH_ENGINE_ENDPOINT")]
    earth_engine_endpoint: Option<String>,

    /// Maximum retries for transient HTTP failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

impl Args {
    /// Settings given on the command line, as a job-file layer.
    fn overrides(&self) -> Result<JobFile> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;

        Ok(JobFile {
            credentials: CredentialsSection {
                service_account: self.service_account.clone(),
                key_file: self.key_file.clone(),
            },
            source: SourceSection {
                project_id: self.project_id.clone(),
                sql: self.sql.clone(),
                sql_file: self.sql_file.as_ref().map(|p| cwd.join(p)),
                location: self.location.clone(),
            },
            imagery: ImagerySection {
                collection: self.collection.clone(),
                start_date: self.start_date.clone(),
                end_date: self.end_date.clone(),
                band_calc: self.band_calc.clone().map(BandCalcSetting::Text),
                scale: self.scale,
            },
            statistics: self.stats.clone(),
            output: OutputSection {
                table: self.output_table.clone(),
                project_id: self.output_project.clone(),
                if_exists: self.if_exists.clone(),
            },
            compute: ComputeSection {
                project_id: self.compute_project.clone(),
                max_features_per_request: self.max_features_per_request,
            },
            endpoints: EndpointsSection {
                bigquery: self.bigquery_endpoint.clone(),
                earth_engine: self.earth_engine_endpoint.clone(),
            },
            http: HttpSection {
                max_retries: self.max_retries,
                ..HttpSection::default()
            },
        })
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let (file, base_dir) = match &args.config {
        Some(path) => (
            JobFile::load(path)?,
            path.parent().map(PathBuf::from).unwrap_or_default(),
        ),
        None => (JobFile::default(), PathBuf::from(".")),
    };
    let job = file.merge(args.overrides()?).validate(&base_dir)?;

    info!(
        source_project = %job.source_project,
        collection = %job.collection,
        date_range = %job.date_range,
        band_calc = %job.band_calc,
        statistics = ?job.statistics.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        destination = %job.output,
        "Starting zonal statistics job"
    );

    let key = ServiceAccountKey::from_file(&job.credentials.key_file).with_context(|| {
        format!(
            "Failed to load service-account key: {}",
            job.credentials.key_file.display()
        )
    })?;
    let mut token_source = ServiceAccountTokenSource::new(key, &scopes::ZONAL_STATS)?;
    if let Some(service_account) = &job.credentials.service_account {
        token_source = token_source.with_issuer(service_account);
    }
    let tokens: Arc<dyn TokenSource> = Arc::new(token_source);

    let bigquery = BigQueryClient::new(
        ApiClient::new(tokens.clone(), job.http.clone())?,
        BigQueryConfig {
            endpoint: job.endpoints.bigquery.clone(),
            location: job.location.clone(),
            ..BigQueryConfig::default()
        },
    );
    let earth_engine = EarthEngineClient::new(
        ApiClient::new(tokens, job.http.clone())?,
        EarthEngineConfig {
            endpoint: job.endpoints.earth_engine.clone(),
            project: job.compute_project.clone(),
        },
    );

    let summary = Pipeline::new(bigquery, earth_engine).run(&job).await?;

    info!(
        rows = summary.rows,
        requests = summary.requests,
        null_values = summary.null_values,
        empty_collection_rows = summary.empty_collection_rows,
        destination = %summary.destination,
        "Job complete"
    );
    Ok(())
}
