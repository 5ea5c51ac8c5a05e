//! CLI entry point for the fuel price tool.
//!
//! Loads monthly open-data exports or live API prices, normalizes them and
//! answers trend, cheapest-station and export queries as JSON on stdout.

mod infra;

use crate::infra::fuelprices::{ApiStatus, FuelPriceApiClient};
use crate::infra::opendata::{DatasetCatalog, OpenDataClient};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fuel_prices::{
    analytics::{RecordFilter, cheapest, dimensions, filter_records, summarize},
    config::Settings,
    fetch::{BasicClient, auth::ApiKey},
    model::CanonicalPriceRecord,
    output::{ExportFormat, export_to_path, write_json},
    pipeline::{CacheAge, Pipeline, PriceTable, live_key},
    profile::QLD_OPEN_DATA_CHANGES,
    services::{CatalogKind, RegionSelector},
};
use std::ffi::OsStr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type LivePipeline = Pipeline<FuelPriceApiClient<ApiKey<BasicClient>>, OpenDataClient<BasicClient>>;

#[derive(Parser)]
#[command(name = "fuel_prices")]
#[command(about = "Queensland fuel price analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where a snapshot comes from: a published month or a local CSV file.
#[derive(Args, Debug)]
struct SourceArgs {
    /// Year of the monthly export
    #[arg(long, default_value_t = 2025)]
    year: i32,

    /// Month of the monthly export (1-12)
    #[arg(long, default_value_t = 1)]
    month: u32,

    /// Read a local CSV export instead of downloading
    #[arg(long, value_name = "CSV")]
    file: Option<PathBuf>,

    /// Schema profile for --file
    #[arg(long, default_value = QLD_OPEN_DATA_CHANGES)]
    profile: String,
}

#[derive(Args, Debug)]
struct RegionArgs {
    /// Geographic region level (1 = suburb, 3 = state)
    #[arg(long)]
    level: Option<u32>,

    /// Geographic region id
    #[arg(long)]
    region_id: Option<u32>,
}

impl RegionArgs {
    fn selector(&self, default: RegionSelector) -> RegionSelector {
        RegionSelector {
            level: self.level.unwrap_or(default.level),
            id: self.region_id.unwrap_or(default.id),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Price statistics for a snapshot
    Summary {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        fuel_type: Option<String>,

        #[arg(long)]
        suburb: Option<String>,
    },
    /// Cheapest stations in a snapshot
    Cheapest {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        fuel_type: String,

        #[arg(long)]
        suburb: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: NonZeroUsize,
    },
    /// Cheapest stations right now, from the live API
    Live {
        #[command(flatten)]
        region: RegionArgs,

        #[arg(long)]
        fuel_type: String,

        #[arg(long)]
        suburb: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: NonZeroUsize,

        /// Keep running and re-rank every SECS seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Raw reference or price listing from the live API
    Catalog {
        #[arg(long, value_enum)]
        kind: CatalogKind,

        #[command(flatten)]
        region: RegionArgs,
    },
    /// API version, connectivity and cache ages
    Status {
        #[command(flatten)]
        region: RegionArgs,
    },
    /// Distinct fuel types, suburbs and brands in a snapshot
    Dimensions {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write filtered records of a snapshot to a file
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        fuel_type: Option<String>,

        #[arg(long)]
        suburb: Option<String>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Output path; defaults to fuel_prices.<format>[.gz]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gzip compress the output
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[derive(serde::Serialize)]
struct StatusReport {
    #[serde(flatten)]
    api: ApiStatus,
    caches: Vec<CacheAge>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing()?;

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to read settings")?;

    match cli.command {
        Commands::Summary {
            source,
            fuel_type,
            suburb,
        } => {
            let pipeline = build_pipeline(&settings, false)?;
            let table = load_snapshot(&pipeline, &source).await?;
            let filter = RecordFilter::new(fuel_type.as_deref(), suburb.as_deref());
            print_json(&summarize(&table.records, &filter))?;
        }
        Commands::Cheapest {
            source,
            fuel_type,
            suburb,
            limit,
        } => {
            let pipeline = build_pipeline(&settings, false)?;
            let table = load_snapshot(&pipeline, &source).await?;
            print_json(&cheapest(&table.records, &fuel_type, suburb.as_deref(), limit))?;
        }
        Commands::Live {
            region,
            fuel_type,
            suburb,
            limit,
            watch,
        } => {
            let pipeline = build_pipeline(&settings, true)?;
            let region = region.selector(pipeline.default_region());
            run_live(&pipeline, region, &fuel_type, suburb.as_deref(), limit, watch).await?;
        }
        Commands::Catalog { kind, region } => {
            let pipeline = build_pipeline(&settings, true)?;
            let selector = (region.level.is_some() || region.region_id.is_some())
                .then(|| region.selector(pipeline.default_region()));
            let listing = pipeline
                .catalog(kind, selector)
                .await
                .with_context(|| format!("Failed to fetch {kind} listing"))?;
            print_json(listing.as_ref())?;
        }
        Commands::Status { region } => {
            let pipeline = build_pipeline(&settings, false)?;
            let region = region.selector(pipeline.default_region());
            let api = pipeline.catalog_api().status().await;
            if !api.is_ok() {
                warn!(connectivity = %api.connectivity, "Live API unreachable");
            }
            print_json(&StatusReport {
                api,
                caches: pipeline.cache_ages(Some(region)),
            })?;
        }
        Commands::Dimensions { source } => {
            let pipeline = build_pipeline(&settings, false)?;
            let table = load_snapshot(&pipeline, &source).await?;
            print_json(&dimensions(&table.records))?;
        }
        Commands::Export {
            source,
            fuel_type,
            suburb,
            format,
            output,
            gzip,
        } => {
            let pipeline = build_pipeline(&settings, false)?;
            let table = load_snapshot(&pipeline, &source).await?;
            let filter = RecordFilter::new(fuel_type.as_deref(), suburb.as_deref());
            let records: Vec<CanonicalPriceRecord> =
                filter_records(&table.records, &filter).cloned().collect();

            let path = output.unwrap_or_else(|| default_export_path(format, gzip));
            export_to_path(&path, &records, format, gzip)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    Ok(())
}

/// Colored stderr plus a JSON rolling log file. The returned guard flushes
/// the file writer on drop.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fuel_prices.log".to_string());
    let log_path = Path::new(&log_file_path);
    let log_dir = log_path.parent().unwrap_or(Path::new("logs"));
    let log_file_name = log_path
        .file_name()
        .unwrap_or(OsStr::new("fuel_prices.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Wires the concrete HTTP clients into a pipeline. Commands that only read
/// exports run without an API token.
fn build_pipeline(settings: &Settings, needs_api: bool) -> Result<LivePipeline> {
    let token = if needs_api {
        settings.require_api_token()?
    } else {
        settings.api_token.as_deref().unwrap_or_default()
    };

    let api_http = BasicClient::new(Duration::from_secs(30))?;
    let api = FuelPriceApiClient::new(
        ApiKey::subscriber_token(api_http, token).context("Invalid FUELPRICES_API_TOKEN")?,
        &settings.base_url,
    );

    let datasets = match &settings.datasets_path {
        Some(path) => DatasetCatalog::load(&path.to_string_lossy())
            .with_context(|| format!("Failed to load dataset map {}", path.display()))?,
        None => DatasetCatalog::builtin(),
    };
    for (period, dataset) in datasets.iter() {
        debug!(%period, profile = %dataset.profile, "Dataset registered");
    }
    let exports = OpenDataClient::new(BasicClient::new(Duration::from_secs(60))?, datasets);

    let profiles = settings.profile_registry()?;
    Ok(Pipeline::new(api, exports, profiles, settings))
}

#[tracing::instrument(skip(pipeline))]
async fn load_snapshot(pipeline: &LivePipeline, source: &SourceArgs) -> Result<Arc<PriceTable>> {
    let table = match &source.file {
        Some(path) => {
            let body = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let profile = pipeline.profiles().get(&source.profile)?;
            Arc::new(PriceTable::from_csv(&body, profile)?)
        }
        None => {
            let Some(table) = pipeline
                .historical(source.year, source.month)
                .await
                .with_context(|| {
                    format!("Failed to load export {}-{:02}", source.year, source.month)
                })?
            else {
                bail!(
                    "No dataset published for {}-{:02}",
                    source.year,
                    source.month
                );
            };
            table
        }
    };

    info!(
        profile = %table.profile,
        accepted = table.report.accepted_rows,
        excluded = table.report.excluded_rows,
        "Snapshot loaded"
    );
    Ok(table)
}

/// Ranks live prices once, or every `watch` seconds until interrupted. A
/// failed refresh falls back to the last good table.
async fn run_live(
    pipeline: &LivePipeline,
    region: RegionSelector,
    fuel_type: &str,
    suburb: Option<&str>,
    limit: NonZeroUsize,
    watch: Option<u64>,
) -> Result<()> {
    let key = live_key(pipeline.country_id(), region);
    let mut ticker = watch.map(|secs| tokio::time::interval(Duration::from_secs(secs.max(1))));

    loop {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        let table = match pipeline.live(Some(region)).await {
            Ok(table) => table,
            Err(err) => match pipeline.stale(&key) {
                Some(stale) if watch.is_some() => {
                    warn!(
                        error = %err,
                        age_secs = stale.age.as_secs(),
                        "Live refresh failed, serving last good prices"
                    );
                    stale.value
                }
                _ => return Err(err).context("Failed to fetch live prices"),
            },
        };

        print_json(&cheapest(&table.records, fuel_type, suburb, limit))?;

        if watch.is_none() {
            return Ok(());
        }
    }
}

fn default_export_path(format: ExportFormat, gzip: bool) -> PathBuf {
    let mut name = format!("fuel_prices.{}", format.extension());
    if gzip {
        name.push_str(".gz");
    }
    PathBuf::from(name)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    write_json(std::io::stdout().lock(), value)?;
    Ok(())
}
