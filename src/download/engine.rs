//! Download engine turning `(url, metadata)` jobs into validated files on disk.
//!
//! Each job runs through the shared [`RateGate`] and the [`RetryPolicy`], is
//! streamed to disk in fixed-size chunks, has its extension corrected from
//! the declared content type or its leading bytes, is validated structurally,
//! and zip archives are expanded next to themselves.
//!
//! # Concurrency Model
//!
//! - [`DownloadEngine::batch`] runs a fixed pool of scoped OS threads
//! - Each worker takes the next job index from a shared counter and owns the
//!   job from dispatch to outcome
//! - Outcomes flow back over a channel and are tallied in completion order
//! - The only cross-worker ordering is the rate gate's spacing of request starts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use annales_core::download::{
//!     ClientOptions, DownloadEngine, DownloadJob, EngineSettings, HttpClient, RateGate,
//!     RetryPolicy,
//! };
//! use annales_core::metadata::DocumentMetadata;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpClient::new(ClientOptions::default())?);
//! let engine = DownloadEngine::new(
//!     client,
//!     Arc::new(RateGate::default()),
//!     RetryPolicy::default(),
//!     EngineSettings::new("data/raw"),
//! );
//! let jobs = vec![DownloadJob::new(
//!     "https://example.com/document/1/download",
//!     DocumentMetadata::default(),
//! )];
//! let result = engine.batch(&jobs, 5)?;
//! println!("{} ok, {} failed", result.successful.len(), result.failed.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, instrument, warn};

use super::archive::expand_archive;
use super::client::Fetch;
use super::constants::CHUNK_SIZE;
use super::filename::{Layout, destination_path, extension_of};
use super::filetype::{TypeSource, UnresolvedTypePolicy, detect, read_head, validate_file};
use super::history::DownloadHistory;
use super::rate_gate::RateGate;
use super::retry::{RetryPolicy, is_retryable};
use super::DownloadError;
use crate::metadata::DocumentMetadata;

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
const MAX_WORKERS: usize = 100;

/// Default worker count if not specified.
pub const DEFAULT_WORKERS: usize = 5;

/// Error type for download engine operations.
///
/// Per-job failures never surface here; they become [`JobOutcome::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A history file could not be written.
    #[error("failed to write {path}: {source}")]
    Persist {
        /// The history file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Creates a persistence error.
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

/// One unit of work: a URL and the metadata that names and files it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub metadata: DocumentMetadata,
}

impl DownloadJob {
    #[must_use]
    pub fn new(url: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            url: url.into(),
            metadata,
        }
    }
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// A new file was written and validated.
    Downloaded(PathBuf),
    /// A valid file was already at the destination; nothing was fetched.
    Skipped(PathBuf),
    /// No valid file was produced; the reason is the error message.
    Failed(String),
}

impl JobOutcome {
    /// The file path for successful outcomes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Downloaded(path) | Self::Skipped(path) => Some(path),
            Self::Failed(_) => None,
        }
    }
}

/// Paths of successful jobs and URLs of failed ones, in completion order.
///
/// Duplicate URLs rejected under [`DuplicateUrlPolicy::Reject`] complete
/// before any dispatched job, so they lead `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Running totals handed to a batch progress callback after each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

/// Handling of a URL that appears more than once in one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateUrlPolicy {
    /// Run every occurrence.
    Allow,
    /// Run the first occurrence; later ones fail without a request.
    #[default]
    Reject,
}

/// Engine behavior that does not change between jobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Root directory for downloaded files.
    pub output_dir: PathBuf,
    /// Year and subject directory levels.
    pub layout: Layout,
    /// Whether a valid file already at the destination short-circuits the job.
    pub skip_existing: bool,
    pub unresolved_type: UnresolvedTypePolicy,
    pub duplicate_urls: DuplicateUrlPolicy,
    /// Whether `batch` draws a terminal progress bar.
    pub show_progress: bool,
}

impl EngineSettings {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: Layout::default(),
            skip_existing: true,
            unresolved_type: UnresolvedTypePolicy::default(),
            duplicate_urls: DuplicateUrlPolicy::default(),
            show_progress: false,
        }
    }
}

/// What the fetch step left on disk.
#[derive(Debug)]
struct Fetched {
    bytes: u64,
    content_type: Option<String>,
}

/// Where the type-correction step left the file.
#[derive(Debug)]
enum Settled {
    /// The new download, possibly renamed.
    New(PathBuf),
    /// A file already existed at the corrected path; the new download was discarded.
    Existing(PathBuf),
}

/// Concurrent downloader with rate gating, retries and validation.
///
/// The engine is `Sync`; [`DownloadEngine::submit`] may be called from any
/// thread and [`DownloadEngine::batch`] shares the engine with its workers.
#[derive(Debug)]
pub struct DownloadEngine {
    fetcher: Arc<dyn Fetch>,
    gate: Arc<RateGate>,
    retry_policy: RetryPolicy,
    settings: EngineSettings,
    history: DownloadHistory,
}

impl DownloadEngine {
    /// Creates an engine around a fetcher, a shared gate and a retry policy.
    #[must_use]
    #[instrument(level = "debug", skip(fetcher, gate, retry_policy))]
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        gate: Arc<RateGate>,
        retry_policy: RetryPolicy,
        settings: EngineSettings,
    ) -> Self {
        debug!(
            max_attempts = retry_policy.max_attempts(),
            rate_limit_ms = gate.delay().as_millis(),
            rate_limit_disabled = gate.is_disabled(),
            "creating download engine"
        );
        Self {
            fetcher,
            gate,
            retry_policy,
            settings,
            history: DownloadHistory::new(),
        }
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Success, failure and expansion records accumulated so far.
    #[must_use]
    pub fn history(&self) -> &DownloadHistory {
        &self.history
    }

    /// Runs one job to completion on the calling thread.
    ///
    /// Failures are recorded in the history and returned as
    /// [`JobOutcome::Failed`]; this never panics or propagates.
    #[instrument(skip(self, job), fields(url = %job.url))]
    pub fn submit(&self, job: &DownloadJob) -> JobOutcome {
        match self.run_job(job) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(url = %job.url, error = %error, "download failed");
                let reason = error.to_string();
                self.history
                    .record_failure(&job.url, &reason, &job.metadata);
                JobOutcome::Failed(reason)
            }
        }
    }

    /// Runs `jobs` on `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkers`] if `workers` is outside 1-100.
    /// Individual job failures do NOT cause this method to error.
    pub fn batch(&self, jobs: &[DownloadJob], workers: usize) -> Result<BatchResult, EngineError> {
        self.batch_with_progress(jobs, workers, |_| {})
    }

    /// Like [`batch`](Self::batch), calling `on_progress` after every job.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkers`] if `workers` is outside 1-100.
    #[instrument(skip(self, jobs, on_progress), fields(jobs = jobs.len()))]
    pub fn batch_with_progress<F>(
        &self,
        jobs: &[DownloadJob],
        workers: usize,
        on_progress: F,
    ) -> Result<BatchResult, EngineError>
    where
        F: Fn(BatchProgress),
    {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(EngineError::InvalidWorkers { value: workers });
        }

        let total = jobs.len();
        info!(total, workers, "starting batch download");

        let bar = progress_bar(total, self.settings.show_progress);
        let mut result = BatchResult::default();
        let mut tally = |job: &DownloadJob, outcome: JobOutcome| {
            match outcome {
                JobOutcome::Downloaded(path) | JobOutcome::Skipped(path) => {
                    result.successful.push(path);
                }
                JobOutcome::Failed(_) => result.failed.push(job.url.clone()),
            }
            bar.inc(1);
            bar.set_message(format!(
                "{} ok, {} failed",
                result.successful.len(),
                result.failed.len()
            ));
            on_progress(BatchProgress {
                successful: result.successful.len(),
                failed: result.failed.len(),
                total,
            });
        };

        let (dispatch, duplicates) = self.partition_duplicates(jobs);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(&DownloadJob, JobOutcome)>();
        for job in duplicates {
            let reason = DownloadError::duplicate_url(&job.url).to_string();
            warn!(url = %job.url, "duplicate URL in batch, not downloading again");
            self.history.record_failure(&job.url, &reason, &job.metadata);
            // The receiver lives until the end of this function.
            let _ = tx.send((job, JobOutcome::Failed(reason)));
        }

        std::thread::scope(|scope| {
            for _ in 0..workers.min(dispatch.len()) {
                let tx = tx.clone();
                let next = &next;
                let dispatch = &dispatch;
                scope.spawn(move || {
                    while let Some(job) = dispatch.get(next.fetch_add(1, Ordering::SeqCst)) {
                        let outcome = self.submit(job);
                        if tx.send((*job, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (job, outcome) in rx {
                tally(job, outcome);
            }
        });

        bar.finish_and_clear();
        info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            total,
            "batch download complete"
        );
        Ok(result)
    }

    fn partition_duplicates<'a>(
        &self,
        jobs: &'a [DownloadJob],
    ) -> (Vec<&'a DownloadJob>, Vec<&'a DownloadJob>) {
        if self.settings.duplicate_urls == DuplicateUrlPolicy::Allow {
            return (jobs.iter().collect(), Vec::new());
        }
        let mut seen: HashSet<&'a str> = HashSet::new();
        jobs.iter().partition(|&job| seen.insert(job.url.as_str()))
    }

    fn run_job(&self, job: &DownloadJob) -> Result<JobOutcome, DownloadError> {
        let destination = destination_path(
            &self.settings.output_dir,
            &job.url,
            &job.metadata,
            self.settings.layout,
        );

        if self.settings.skip_existing && destination.exists() {
            match validate_file(&destination) {
                Ok(()) => {
                    info!(path = %destination.display(), "skipping existing file");
                    return Ok(JobOutcome::Skipped(destination));
                }
                Err(error) => {
                    debug!(error = %error, "existing file invalid, downloading again");
                }
            }
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| DownloadError::io(parent, e))?;
        }

        let fetched = self.retry_policy.run(
            |attempt| {
                debug!(attempt, "attempting download");
                self.gate.acquire();
                self.fetch_to_file(&job.url, &destination)
            },
            is_retryable,
        )?;

        match self.settle_type(&job.url, &destination, fetched.content_type.as_deref())? {
            Settled::Existing(path) => {
                validate_file(&path)?;
                let size = fs::metadata(&path).map_or(0, |m| m.len());
                self.history
                    .record_success(&job.url, &path, size, &job.metadata);
                info!(path = %path.display(), "using file already at corrected path");
                self.expand_if_archive(&path);
                Ok(JobOutcome::Downloaded(path))
            }
            Settled::New(path) => {
                if let Err(error) = validate_file(&path) {
                    remove_quietly(&path);
                    return Err(error);
                }
                self.history
                    .record_success(&job.url, &path, fetched.bytes, &job.metadata);
                info!(path = %path.display(), bytes = fetched.bytes, "download completed");
                self.expand_if_archive(&path);
                Ok(JobOutcome::Downloaded(path))
            }
        }
    }

    /// Streams the response body to `path` in fixed-size chunks.
    ///
    /// A body error removes the partial file.
    fn fetch_to_file(&self, url: &str, path: &Path) -> Result<Fetched, DownloadError> {
        let response = self.fetcher.open(url)?;
        let file = File::create(path).map_err(|e| DownloadError::io(path, e))?;

        match copy_chunks(response.body, file, url, path) {
            Ok(bytes) => {
                debug!(bytes, content_type = ?response.content_type, "body written");
                Ok(Fetched {
                    bytes,
                    content_type: response.content_type,
                })
            }
            Err(error) => {
                remove_quietly(path);
                Err(error)
            }
        }
    }

    /// Renames the download to its detected extension.
    fn settle_type(
        &self,
        url: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<Settled, DownloadError> {
        let head = read_head(path).map_err(|e| DownloadError::io(path, e))?;
        let detected = detect(content_type, &head);
        debug!(extension = detected.extension, source = ?detected.source, "detected file type");

        if detected.source == TypeSource::Unresolved
            && self.settings.unresolved_type == UnresolvedTypePolicy::Reject
        {
            remove_quietly(path);
            return Err(DownloadError::unresolved_type(url));
        }

        let current = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(extension_of);
        if current.as_deref() == Some(detected.extension) {
            return Ok(Settled::New(path.to_path_buf()));
        }

        let corrected = path.with_extension(detected.extension);
        if corrected.exists() {
            warn!(path = %corrected.display(), "file already exists with corrected extension");
            remove_quietly(path);
            return Ok(Settled::Existing(corrected));
        }

        fs::rename(path, &corrected).map_err(|e| DownloadError::io(&corrected, e))?;
        info!(
            from = %path.display(),
            to = %corrected.display(),
            "renamed file to detected extension"
        );
        Ok(Settled::New(corrected))
    }

    fn expand_if_archive(&self, path: &Path) {
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if !is_zip {
            return;
        }
        if let Err(error) = expand_archive(path) {
            warn!(path = %path.display(), error = %error, "archive expansion failed");
            self.history
                .record_expansion_failure(path, &error.to_string());
        }
    }
}

fn copy_chunks(
    mut body: Box<dyn Read + Send>,
    mut file: File,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::stream(url, e)),
        };
        file.write_all(&buffer[..read])
            .map_err(|e| DownloadError::io(path, e))?;
        total += read as u64;
    }
    file.flush().map_err(|e| DownloadError::io(path, e))?;
    Ok(total)
}

fn remove_quietly(path: &Path) {
    if let Err(error) = fs::remove_file(path)
        && error.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "could not remove file");
    }
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
