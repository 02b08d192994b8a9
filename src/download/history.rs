//! In-memory outcome records for a download run, and their JSON persistence.
//!
//! Records are appended from worker threads; each list is behind its own mutex.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use super::engine::EngineError;
use crate::metadata::DocumentMetadata;

/// A file that was written and passed validation.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub url: String,
    pub filepath: PathBuf,
    pub size: u64,
    pub timestamp: DateTime<Local>,
    pub metadata: DocumentMetadata,
}

/// A job that ended without a valid file.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Local>,
    pub metadata: DocumentMetadata,
}

/// A downloaded archive that could not be expanded. The download itself stands.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionFailure {
    pub archive: PathBuf,
    pub error: String,
    pub timestamp: DateTime<Local>,
}

/// Append-only history shared by all workers of an engine.
#[derive(Debug, Default)]
pub struct DownloadHistory {
    records: Mutex<Vec<DownloadRecord>>,
    failures: Mutex<Vec<FailureRecord>>,
    expansion_failures: Mutex<Vec<ExpansionFailure>>,
}

// Appends never leave a list half-written, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DownloadHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        url: &str,
        filepath: &Path,
        size: u64,
        metadata: &DocumentMetadata,
    ) {
        lock(&self.records).push(DownloadRecord {
            url: url.to_string(),
            filepath: filepath.to_path_buf(),
            size,
            timestamp: Local::now(),
            metadata: metadata.clone(),
        });
    }

    pub fn record_failure(&self, url: &str, error: &str, metadata: &DocumentMetadata) {
        lock(&self.failures).push(FailureRecord {
            url: url.to_string(),
            error: error.to_string(),
            timestamp: Local::now(),
            metadata: metadata.clone(),
        });
    }

    pub fn record_expansion_failure(&self, archive: &Path, error: &str) {
        lock(&self.expansion_failures).push(ExpansionFailure {
            archive: archive.to_path_buf(),
            error: error.to_string(),
            timestamp: Local::now(),
        });
    }

    /// Snapshot of the success records.
    #[must_use]
    pub fn records(&self) -> Vec<DownloadRecord> {
        lock(&self.records).clone()
    }

    /// Snapshot of the failure records.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        lock(&self.failures).clone()
    }

    /// Snapshot of the archive expansion failures.
    #[must_use]
    pub fn expansion_failures(&self) -> Vec<ExpansionFailure> {
        lock(&self.expansion_failures).clone()
    }

    /// Writes the success records as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persist`] if the file cannot be written.
    pub fn save_records(&self, path: &Path) -> Result<(), EngineError> {
        let records = self.records();
        write_json(path, &records)?;
        info!(count = records.len(), path = %path.display(), "Saved download history");
        Ok(())
    }

    /// Writes the failure records as a JSON array, only when there are any.
    ///
    /// Returns whether a file was written.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persist`] if the file cannot be written.
    pub fn save_failures(&self, path: &Path) -> Result<bool, EngineError> {
        let failures = self.failures();
        if failures.is_empty() {
            info!("No failed downloads to save");
            return Ok(false);
        }
        write_json(path, &failures)?;
        warn!(count = failures.len(), path = %path.display(), "Saved failed downloads");
        Ok(true)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::persist(path, e))?;
    }
    let file = File::create(path).map_err(|e| EngineError::persist(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| EngineError::persist(path, e.into()))?;
    writer.flush().map_err(|e| EngineError::persist(path, e))
}
