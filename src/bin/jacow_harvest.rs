use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use jacow_harvester::app::Harvester;
use jacow_harvester::config::{ConfigLoader, ConfigOverrides, HarvestConfig};
use jacow_harvester::error::HarvestError;
use jacow_harvester::http::HttpFetcher;
use jacow_harvester::output::{JsonOutput, LogSink};
use jacow_harvester::store::OutputLayout;

#[derive(Parser)]
#[command(name = "jacow-harvest")]
#[command(about = "Harvest JACoW conference proceedings: sessions, paper metadata and PDFs")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./jacow-harvest.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Output directory
    #[arg(long)]
    output: Option<String>,

    /// Only harvest this session code (repeatable)
    #[arg(long = "session", value_name = "CODE")]
    sessions: Vec<String>,

    /// Only harvest the first N selected sessions
    #[arg(long)]
    limit: Option<usize>,

    /// Parse and export metadata without downloading files
    #[arg(long)]
    no_download: bool,

    /// Keep each session page's text under Debug/
    #[arg(long)]
    save_page_text: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::InvalidSessionCode(_) => 2,
        HarvestError::Http { .. }
        | HarvestError::Status { .. }
        | HarvestError::TooSmall { .. }
        | HarvestError::NotPdf { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        output_dir: cli.output,
        sessions: cli.sessions,
        limit: cli.limit,
        no_download: cli.no_download,
        save_page_text: cli.save_page_text,
    };
    let config = ConfigLoader::resolve_with(cli.config.as_deref(), overrides)?;
    init_logging(&config)?;

    tracing::info!(
        "harvesting {} from {} into {}",
        config.conference,
        config.base_url,
        config.output_dir
    );
    let fetcher = HttpFetcher::new(&config)?;
    let harvester = Harvester::new(config, fetcher);

    if cli.json {
        let report = harvester.run(&JsonOutput)?;
        JsonOutput::print_report(&report).into_diagnostic()?;
    } else {
        let report = harvester.run(&LogSink)?;
        println!(
            "{} papers indexed across {} sessions; {} failed downloads",
            report.papers_indexed,
            report.sessions.len(),
            report.failures.len()
        );
        println!("report: {}", harvester.layout().report_path());
    }
    Ok(())
}

/// Stderr plus `<output>/harvest.log`, both behind one `RUST_LOG` filter.
fn init_logging(config: &HarvestConfig) -> Result<(), HarvestError> {
    let layout = OutputLayout::from_config(config);
    fs::create_dir_all(layout.root().as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("create {}: {err}", layout.root())))?;
    let log_path = layout.log_path();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("open {log_path}: {err}")))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
    Ok(())
}
