//! Concurrent download engine for harvested exam documents.
//!
//! This module turns `(url, metadata)` jobs into validated files organized
//! under an output root.
//!
//! # Features
//!
//! - Bounded worker pool over blocking HTTP (default width 5)
//! - Shared rate gate spacing request starts across all workers
//! - Bounded retries with exponential backoff for transient failures
//! - Streaming writes in 8 KiB chunks
//! - Extension correction from `Content-Type` or file signature
//! - Structural validation (PDF signature, archive integrity, minimum sizes)
//! - Zip expansion next to the archive
//! - JSON success and failure history
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use annales_core::download::{
//!     ClientOptions, DownloadEngine, DownloadJob, EngineSettings, HttpClient, RateGate,
//!     RetryPolicy,
//! };
//! use annales_core::metadata::parse_link;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let url = "https://eduscol.education.fr/document/63414/download";
//! let engine = DownloadEngine::new(
//!     Arc::new(HttpClient::new(ClientOptions::default())?),
//!     Arc::new(RateGate::new(Duration::from_millis(1500))),
//!     RetryPolicy::default(),
//!     EngineSettings::new("data/raw"),
//! );
//! let outcome = engine.submit(&DownloadJob::new(url, parse_link(url, None)));
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod archive;
mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod filetype;
mod history;
mod rate_gate;
mod retry;

pub use archive::{expand_archive, expansion_dir};
pub use client::{ClientOptions, Fetch, FetchResponse, HttpClient};
pub use constants::{DEFAULT_REQUEST_DELAY, DEFAULT_REQUEST_TIMEOUT};
pub use engine::{
    BatchProgress, BatchResult, DEFAULT_WORKERS, DownloadEngine, DownloadJob, DuplicateUrlPolicy,
    EngineError, EngineSettings, JobOutcome,
};
pub use error::DownloadError;
pub use filename::{
    Layout, PROVISIONAL_EXTENSION, destination_dir, destination_path, extension_of, job_filename,
    sanitize_filename,
};
pub use filetype::{
    DetectedType, GENERIC_EXTENSION, TypeSource, UnresolvedTypePolicy, detect,
    extension_for_content_type, sniff_extension, validate_file,
};
pub use history::{DownloadHistory, DownloadRecord, ExpansionFailure, FailureRecord};
pub use rate_gate::RateGate;
pub use retry::{
    DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, FailureType, RetryPolicy, Sleeper, ThreadSleeper,
    classify_error, is_retryable,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
