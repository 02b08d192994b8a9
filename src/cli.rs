//! CLI argument definitions using clap derive macros.
//!
//! Options that also exist in the config file are `Option`s so that an absent
//! flag leaves the layered value untouched.

use std::path::PathBuf;
use std::time::Duration;

use annales_core::Settings;
use clap::Parser;

/// Harvest the exam annales catalog and download its documents.
///
/// Crawls the paginated catalog, prints a summary, and optionally validates
/// the classification (CSV report, exit code 0/1) and downloads every file.
#[derive(Parser, Debug)]
#[command(name = "annales")]
#[command(author, version, about)]
pub struct Args {
    /// Catalog URL to crawl (defaults to the configured base URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Maximum number of catalog pages to visit
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: Option<u32>,

    /// Write the validation report and exit 1 if any row is incomplete
    #[arg(long)]
    pub validate: bool,

    /// Download every discovered document
    #[arg(long)]
    pub download: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Config file (defaults to ~/.config/annales/config.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory for downloaded files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Concurrent download workers (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=100))]
    pub workers: Option<u16>,

    /// Minimum delay between request starts in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Maximum attempts per download (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Path of the validation report CSV
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Show the browser window while crawling
    #[arg(long)]
    pub headed: bool,

    /// Skip TLS certificate verification for downloads
    #[arg(long)]
    pub insecure: bool,
}

impl Args {
    /// Applies the flags that were given on top of `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.base_url.clone_from(url);
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir.clone_from(dir);
        }
        if let Some(workers) = self.workers {
            settings.workers = usize::from(workers);
        }
        if let Some(ms) = self.rate_limit {
            settings.request_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(report) = &self.report {
            settings.report_path.clone_from(report);
        }
        if self.headed {
            settings.headless = false;
        }
        if self.insecure {
            settings.verify_tls = false;
        }
    }

    /// Page limit for the crawl, `None` meaning the walker's ceiling.
    #[must_use]
    pub fn max_pages(&self) -> Option<usize> {
        self.pages.and_then(|p| usize::try_from(p).ok())
    }
}
