//! CLI entry point for the annales harvester.

use std::fs::{self, File};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use annales_core::crawl::{ChromeOptions, ChromeSession, CrawlOutput, CrawlWalker, WalkerOptions};
use annales_core::download::{DownloadEngine, HttpClient, RateGate, RetryPolicy};
use annales_core::{CrawlSummary, DownloadStats, Settings, ValidationReport};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::Args;

fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args)?;

    debug!(?args, "CLI arguments parsed");
    info!("Annales harvester starting");

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    args.apply_to(&mut settings);
    settings.validate().context("Invalid settings")?;
    debug!(?settings, "settings resolved");

    let output = crawl(&settings, &args)?;
    print!("\n{}", CrawlSummary::from_links(&output.links));

    let mut exit_code = ExitCode::SUCCESS;
    let mut validation_ok = true;
    if args.validate {
        let code = validate(&settings, &output)?;
        validation_ok = code == 0;
        exit_code = ExitCode::from(code);
    }

    if args.download {
        if validation_ok {
            download(&settings, &output, args.quiet)?;
        } else {
            error!("Validation failed; skipping download");
        }
    }

    Ok(exit_code)
}

/// Log level priority: `RUST_LOG` > `--quiet` > `-v` count > info.
fn init_tracing(args: &Args) -> Result<()> {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file '{}'", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn crawl(settings: &Settings, args: &Args) -> Result<CrawlOutput> {
    info!(url = %settings.base_url, pages = ?args.pages, "Crawling catalog");

    let session = ChromeSession::launch(ChromeOptions {
        headless: settings.headless,
        request_timeout: settings.browser_timeout,
    })
    .context("Failed to start the browser")?;

    let options = WalkerOptions {
        load_timeout: settings.browser_timeout,
        settle_delay: settings.page_load_wait,
        ..WalkerOptions::default()
    };
    let walker = CrawlWalker::new(session, &settings.base_url, options)?;
    let output = walker
        .extract(args.max_pages())
        .with_context(|| format!("Failed to crawl '{}'", settings.base_url))?;

    info!(
        links = output.links.len(),
        entries = output.entries.len(),
        pages = output.pages_visited,
        "Crawl complete"
    );
    Ok(output)
}

/// Writes the validation report and returns the process exit code.
fn validate(settings: &Settings, output: &CrawlOutput) -> Result<u8> {
    let report = ValidationReport::from_entries(&output.entries);
    let path = settings.report_path.as_path();
    ensure_parent(path)?;
    report.write_csv(path)?;

    println!("Validation report written to {}", path.display());
    Ok(report.exit_code())
}

fn download(settings: &Settings, output: &CrawlOutput, quiet: bool) -> Result<()> {
    let jobs = output.download_jobs();
    if jobs.is_empty() {
        warn!("No documents to download");
        return Ok(());
    }

    let client = HttpClient::new(settings.client_options()).context("Failed to build HTTP client")?;
    let gate = Arc::new(RateGate::new(settings.request_delay));
    let retry_policy = RetryPolicy::new(settings.max_retries, settings.backoff_base);
    let mut engine_settings = settings.engine_settings();
    engine_settings.show_progress = !quiet;

    let engine = DownloadEngine::new(Arc::new(client), gate, retry_policy, engine_settings);
    info!(output_dir = %settings.output_dir.display(), "Downloading");
    let result = engine.batch(&jobs, settings.workers)?;

    let history = engine.history();
    print!(
        "\n{}",
        DownloadStats::from_history(&history.records(), &history.failures())
    );

    history.save_records(&settings.history_path())?;
    if history.save_failures(&settings.failures_path())? {
        warn!(failed = result.failed.len(), "Some downloads failed");
    }
    for failure in history.expansion_failures() {
        warn!(archive = %failure.archive.display(), error = %failure.error, "Archive not expanded");
    }

    info!(
        successful = result.successful.len(),
        failed = result.failed.len(),
        "Download complete"
    );
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}
