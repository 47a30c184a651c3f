//! CivicLoop CLI

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use civicloop_core::{
    BaselineSource, FileKeyValueStore, HazardAnalyzer, HazardRecord, HazardStore,
    ReportPipeline, ReportRequest, Settings, UnavailableAnalyzer, ENV_ANALYSIS_API_KEY,
    VOICE_REPORT_LATITUDE, VOICE_REPORT_LONGITUDE,
};
use civicloop_nlu::{AnalysisClient, AnalysisConfig};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Dataset shipped with the binary
const BASELINE_POTHOLES: &str = include_str!("../data/potholes.json");

#[derive(Parser)]
#[command(name = "civicloop")]
#[command(about = "CivicLoop - report and browse road hazards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// File a pothole report; with no arguments this is the voice report
    Report {
        /// Latitude of the hazard
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of the hazard
        #[arg(long, allow_negative_numbers = true)]
        long: Option<f64>,

        /// Report date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List known hazards, baseline first
    List {
        /// Only show hazards a claim can be filed against
        #[arg(long)]
        actionable: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one hazard and whether a claim can be filed
    Show {
        /// Hazard id
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    let store = open_store(&settings).await;

    match cli.command {
        Commands::Report { lat, long, date } => {
            let request = if lat.is_none() && long.is_none() && date.is_none() {
                None
            } else {
                Some(ReportRequest {
                    latitude: lat.unwrap_or(VOICE_REPORT_LATITUDE),
                    longitude: long.unwrap_or(VOICE_REPORT_LONGITUDE),
                    reported_on: date.unwrap_or_else(|| Local::now().date_naive()),
                })
            };
            report(store, build_analyzer(&settings), request).await
        }
        Commands::List { actionable, json } => list(&store, actionable, json),
        Commands::Show { id } => show(&store, &id),
    }
}

async fn open_store(settings: &Settings) -> HazardStore {
    let baseline = match &settings.baseline_path {
        Some(path) => BaselineSource::File(path.clone()),
        None => BaselineSource::Embedded(BASELINE_POTHOLES),
    };
    let kv = Arc::new(FileKeyValueStore::new(settings.kv_dir()));
    HazardStore::open(baseline, kv).await
}

fn build_analyzer(settings: &Settings) -> Arc<dyn HazardAnalyzer> {
    let api_key = std::env::var(ENV_ANALYSIS_API_KEY).ok();
    let client =
        AnalysisConfig::from_settings(settings, api_key).and_then(AnalysisClient::new);

    match client {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "Remote analysis disabled");
            Arc::new(UnavailableAnalyzer::new(e.to_string()))
        }
    }
}

async fn report(
    store: HazardStore,
    analyzer: Arc<dyn HazardAnalyzer>,
    request: Option<ReportRequest>,
) -> anyhow::Result<()> {
    let pipeline = ReportPipeline::new(store, analyzer);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Reporting pothole...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = match request {
        Some(request) => pipeline.submit(request).await,
        None => pipeline.submit_voice_report().await,
    };
    spinner.finish_and_clear();

    let outcome = outcome.context("Report was not saved")?;
    let line = if outcome.analyzed() {
        style(outcome.message()).green()
    } else {
        style(outcome.message()).yellow()
    };
    println!("{line}");
    println!("  id: {}", style(&outcome.record.id).dim());
    Ok(())
}

fn list(store: &HazardStore, actionable_only: bool, as_json: bool) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    let all = store.potholes();
    let potholes: Vec<&HazardRecord> = all
        .iter()
        .filter(|r| !actionable_only || r.is_actionable(today))
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&potholes)?);
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{} hazards ({} baseline, {} reported)",
            all.len(),
            store.baseline().len(),
            store.reports().len()
        ))
        .bold()
    );
    for record in potholes {
        print_row(record, today);
    }
    Ok(())
}

fn print_row(record: &HazardRecord, today: NaiveDate) {
    let status = record.claim_status(today);
    let marker = if record.is_actionable(today) {
        style("●").red()
    } else {
        style("●").yellow()
    };
    println!(
        "{marker} {:<38} {:>9.4} {:>10.4}  {}  {}",
        record.id, record.latitude, record.longitude, record.date_reported, status
    );
}

fn show(store: &HazardStore, id: &str) -> anyhow::Result<()> {
    let record = store
        .find(id)
        .ok_or_else(|| anyhow::anyhow!("No hazard with id {id}"))?;
    let today = Local::now().date_naive();
    let status = record.claim_status(today);

    println!("{}", style(format!("Hazard {}", record.id)).bold().cyan());
    println!("  Location:      {}, {}", record.latitude, record.longitude);
    println!("  Date Reported: {}", record.date_reported);
    match record.age_in_days(today) {
        Some(days) => println!("  Age:           {days} days"),
        None => println!("  Age:           unknown (unparsable date)"),
    }
    let status_line = if record.is_actionable(today) {
        style(status.label()).green().bold()
    } else {
        style(status.label()).yellow().bold()
    };
    println!("  Status:        {status_line}");
    println!("  {}", status.explanation());
    Ok(())
}
