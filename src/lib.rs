//! Annales Core Library
//!
//! This library harvests the exam annales catalog: it walks the paginated,
//! JavaScript-driven catalog, classifies every document, and downloads the
//! files into an organized tree.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`crawl`] - Browser session abstraction and the paginated catalog walker
//! - [`metadata`] - Categorical codes, text normalization, link parsing
//! - [`download`] - Rate gate, retry policy and the thread-based download engine
//! - [`report`] - Crawl summary, download statistics, CSV validation report
//! - [`config`] - Settings with file and environment layering

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod download;
pub mod metadata;
pub mod report;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, Settings};
pub use crawl::{
    BrowserSession, ChromeOptions, ChromeSession, CrawlError, CrawlOutput, CrawlWalker,
    SessionError, WalkerOptions,
};
pub use download::{
    BatchResult, DEFAULT_WORKERS, DownloadEngine, DownloadError, DownloadJob, EngineError,
    EngineSettings, HttpClient, RateGate, RetryPolicy,
};
pub use metadata::{DocumentMetadata, ExamEntry, ExamFile, parse_link};
pub use report::{CrawlSummary, DownloadStats, ReportError, ValidationReport, format_bytes};
