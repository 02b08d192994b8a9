//! Crawl summary, download statistics and the CSV validation report.
//!
//! The validation report's exit code is a contract for automation callers:
//! `0` when every row is fully classified and complete, `1` otherwise.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::crawl::LinkRecord;
use crate::download::{DownloadRecord, FailureRecord};
use crate::metadata::{DocumentType, ExamEntry, ExamFile};

const RULE_WIDTH: usize = 60;

/// Error type for report output.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The CSV file could not be created or written.
    #[error("failed to write report {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Flushing the report to disk failed.
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Formats a byte count with two decimals in binary units, e.g. `1.50 KB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

fn rule(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", "=".repeat(RULE_WIDTH))
}

// ==================== Crawl summary ====================

/// Counts of discovered documents by year, subject and document type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total: usize,
    pub by_year: BTreeMap<u16, usize>,
    pub by_subject: BTreeMap<String, usize>,
    pub sujets: usize,
    pub corrections: usize,
}

impl CrawlSummary {
    #[must_use]
    pub fn from_links(links: &[LinkRecord]) -> Self {
        let mut summary = Self {
            total: links.len(),
            ..Self::default()
        };
        for link in links {
            let metadata = link.metadata();
            if let Some(year) = metadata.year {
                *summary.by_year.entry(year).or_default() += 1;
            }
            if let Some(subject) = metadata.subject_dir() {
                *summary.by_subject.entry(subject).or_default() += 1;
            }
            match metadata.document_type {
                DocumentType::Sujet => summary.sujets += 1,
                DocumentType::Correction => summary.corrections += 1,
            }
        }
        info!(
            total = summary.total,
            years = summary.by_year.len(),
            subjects = summary.by_subject.len(),
            "summarized crawl"
        );
        summary
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        rule(f)?;
        writeln!(f, "ANNALES CRAWL SUMMARY")?;
        rule(f)?;
        writeln!(f, "\nTotal documents found: {}", self.total)?;
        writeln!(
            f,
            "Sujets: {}, corrections: {}",
            self.sujets, self.corrections
        )?;
        if !self.by_year.is_empty() {
            writeln!(f, "\nAvailable years ({}):", self.by_year.len())?;
            for (year, count) in self.by_year.iter().rev() {
                writeln!(f, "  - {year}: {count} files")?;
            }
        }
        if !self.by_subject.is_empty() {
            writeln!(f, "\nAvailable subjects ({}):", self.by_subject.len())?;
            for (subject, count) in &self.by_subject {
                writeln!(f, "  - {subject}: {count} files")?;
            }
        }
        writeln!(f)?;
        rule(f)
    }
}

// ==================== Download statistics ====================

/// Totals over a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloads: usize,
    pub failures: usize,
    pub total_bytes: u64,
    /// Keyed by lowercase extension with dot, `.unknown` when there is none.
    pub by_file_type: BTreeMap<String, usize>,
    pub by_year: BTreeMap<u16, usize>,
    pub by_subject: BTreeMap<String, usize>,
}

impl DownloadStats {
    #[must_use]
    pub fn from_history(records: &[DownloadRecord], failures: &[FailureRecord]) -> Self {
        let mut stats = Self {
            downloads: records.len(),
            failures: failures.len(),
            total_bytes: records.iter().map(|r| r.size).sum(),
            ..Self::default()
        };
        for record in records {
            let extension = record
                .filepath
                .extension()
                .and_then(|e| e.to_str())
                .map_or_else(|| ".unknown".to_string(), |e| format!(".{}", e.to_lowercase()));
            *stats.by_file_type.entry(extension).or_default() += 1;
            if let Some(year) = record.metadata.year {
                *stats.by_year.entry(year).or_default() += 1;
            }
            if let Some(subject) = record.metadata.subject_dir() {
                *stats.by_subject.entry(subject).or_default() += 1;
            }
        }
        stats
    }
}

impl fmt::Display for DownloadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        rule(f)?;
        writeln!(f, "DOWNLOAD STATISTICS")?;
        rule(f)?;
        writeln!(f, "\nTotal downloads: {}", self.downloads)?;
        writeln!(f, "Total failures: {}", self.failures)?;
        writeln!(f, "Total size: {}", format_bytes(self.total_bytes))?;
        if !self.by_file_type.is_empty() {
            writeln!(f, "\nDownloads by file type:")?;
            for (extension, count) in &self.by_file_type {
                writeln!(f, "  - {extension}: {count} files")?;
            }
        }
        if !self.by_year.is_empty() {
            writeln!(f, "\nDownloads by year:")?;
            for (year, count) in self.by_year.iter().rev() {
                writeln!(f, "  - {year}: {count} files")?;
            }
        }
        if !self.by_subject.is_empty() {
            writeln!(f, "\nDownloads by subject:")?;
            for (subject, count) in &self.by_subject {
                writeln!(f, "  - {subject}: {count} files")?;
            }
        }
        writeln!(f)?;
        rule(f)
    }
}

// ==================== Validation report ====================

/// Per-row status in the validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "MISSING")]
    Missing,
}

/// One CSV line: an entry file, or an entry with no files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRow {
    #[serde(rename = "ID")]
    pub id: usize,
    #[serde(rename = "IDFile")]
    pub file_id: String,
    #[serde(rename = "Session")]
    pub session: String,
    #[serde(rename = "Discipline")]
    pub discipline: String,
    #[serde(rename = "Serie")]
    pub serie: String,
    #[serde(rename = "Localisation")]
    pub localisation: String,
    #[serde(rename = "Files_Count")]
    pub files_count: usize,
    #[serde(rename = "Status")]
    pub status: RowStatus,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "FileNameToSave")]
    pub file_name_to_save: String,
    #[serde(rename = "Link")]
    pub link: String,
}

/// Rows of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub rows: Vec<ValidationRow>,
}

impl ValidationReport {
    /// Builds one row per entry file; an entry without files yields one
    /// `MISSING` row.
    #[must_use]
    pub fn from_entries(entries: &[ExamEntry]) -> Self {
        let rows = entries
            .iter()
            .flat_map(|entry| {
                if entry.files().is_empty() {
                    vec![validation_row(entry, None)]
                } else {
                    entry
                        .files()
                        .iter()
                        .map(|file| validation_row(entry, Some(file)))
                        .collect()
                }
            })
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn missing(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == RowStatus::Missing)
            .count()
    }

    /// `0` when every row is `OK`, `1` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.missing() > 0)
    }

    /// Writes the rows as CSV with the fixed header.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if the file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<(), ReportError> {
        let csv_error = |source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        if self.rows.is_empty() {
            writer
                .write_record(VALIDATION_HEADER)
                .map_err(csv_error)?;
        }
        for row in &self.rows {
            writer.serialize(row).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let missing = self.missing();
        if missing > 0 {
            warn!(rows = self.rows.len(), missing, path = %path.display(), "validation report has missing rows");
        } else {
            info!(rows = self.rows.len(), path = %path.display(), "validation report written");
        }
        Ok(())
    }
}

const VALIDATION_HEADER: [&str; 11] = [
    "ID",
    "IDFile",
    "Session",
    "Discipline",
    "Serie",
    "Localisation",
    "Files_Count",
    "Status",
    "FileName",
    "FileNameToSave",
    "Link",
];

fn validation_row(entry: &ExamEntry, file: Option<&ExamFile>) -> ValidationRow {
    let save_name = file.and_then(|f| entry.save_name(f));
    let complete = file.is_some_and(|f| {
        f.file_id.is_some() && f.filename.is_some() && !f.download_url.is_empty()
    }) && save_name.is_some();
    let status = if complete && entry.is_fully_classified() {
        RowStatus::Ok
    } else {
        RowStatus::Missing
    };

    ValidationRow {
        id: entry.id,
        file_id: file.and_then(|f| f.file_id.clone()).unwrap_or_default(),
        session: entry.session.map(|s| s.to_string()).unwrap_or_default(),
        discipline: code_or_empty(entry.discipline),
        serie: code_or_empty(entry.serie),
        localisation: code_or_empty(entry.localisation),
        files_count: entry.files().len(),
        status,
        file_name: file.and_then(|f| f.filename.clone()).unwrap_or_default(),
        file_name_to_save: save_name.unwrap_or_default(),
        link: file.map(|f| f.download_url.clone()).unwrap_or_default(),
    }
}

fn code_or_empty<C: crate::metadata::CategoryCode>(code: Option<C>) -> String {
    code.map(|c| c.as_code().to_string()).unwrap_or_default()
}
