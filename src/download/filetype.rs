//! True file type detection and structural validation.
//!
//! A specific declared `Content-Type` wins. Generic, missing or unknown types
//! fall back to the file's leading bytes; if those match nothing the type is
//! unresolved and the generic `bin` extension applies.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use super::constants::{MIN_DOC_SIZE, MIN_FILE_SIZE, MIN_PDF_SIZE, SNIFF_LEN};
use super::error::DownloadError;

/// Extension used when neither signal identifies the file.
pub const GENERIC_EXTENSION: &str = "bin";

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// What to do when a body's type cannot be determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedTypePolicy {
    /// Keep the file under the generic `.bin` extension.
    #[default]
    KeepGeneric,
    /// Delete the file and fail the job.
    Reject,
}

/// Which signal decided a file's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    ContentType,
    Signature,
    Unresolved,
}

/// The detected extension (without dot) and how it was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedType {
    pub extension: &'static str,
    pub source: TypeSource,
}

/// Maps a declared content type to an extension.
///
/// Generic types (`application/octet-stream` and friends) and unknown types
/// return `None`.
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" | "application/x-pdf" => Some("pdf"),
        "application/zip" | "application/x-zip-compressed" | "application/x-zip" => Some("zip"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.oasis.opendocument.text" => Some("odt"),
        _ => None,
    }
}

/// Identifies a file from its leading bytes.
#[must_use]
pub fn sniff_extension(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(PDF_MAGIC) {
        Some("pdf")
    } else if head.starts_with(ZIP_MAGIC) {
        Some("zip")
    } else if head.starts_with(OLE_MAGIC) {
        Some("doc")
    } else {
        None
    }
}

/// Combines the declared content type and the leading bytes into a type.
#[must_use]
pub fn detect(content_type: Option<&str>, head: &[u8]) -> DetectedType {
    if let Some(extension) = content_type.and_then(extension_for_content_type) {
        return DetectedType {
            extension,
            source: TypeSource::ContentType,
        };
    }
    match sniff_extension(head) {
        Some(extension) => DetectedType {
            extension,
            source: TypeSource::Signature,
        },
        None => DetectedType {
            extension: GENERIC_EXTENSION,
            source: TypeSource::Unresolved,
        },
    }
}

/// Reads up to the first few bytes of a file for sniffing.
///
/// # Errors
///
/// Returns the IO error if the file cannot be opened or read.
pub fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

/// Checks that a file on disk is plausibly what its extension says.
///
/// | Extension | Rule |
/// |-----------|------|
/// | `pdf` | size ≥ 1024 and starts with `%PDF` |
/// | `zip`, `docx`, `odt` | size ≥ 100 and the archive opens |
/// | `doc` | size > 1000 |
/// | anything else | size ≥ 100 |
///
/// # Errors
///
/// Returns [`DownloadError::Validation`] naming the failed check. The file is
/// left in place; removing it is the caller's decision.
pub fn validate_file(path: &Path) -> Result<(), DownloadError> {
    let size = std::fs::metadata(path)
        .map_err(|e| DownloadError::validation(path, format!("unreadable: {e}")))?
        .len();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let result = match extension.as_str() {
        "pdf" => validate_pdf(path, size),
        "zip" | "docx" | "odt" => validate_archive(path, size),
        "doc" if size <= MIN_DOC_SIZE => Err(format!("too small for a doc file ({size} bytes)")),
        "doc" => Ok(()),
        _ if size < MIN_FILE_SIZE => Err(format!("too small ({size} bytes)")),
        _ => Ok(()),
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), size, "validation passed");
            Ok(())
        }
        Err(reason) => {
            warn!(path = %path.display(), %reason, "validation failed");
            Err(DownloadError::validation(path, reason))
        }
    }
}

fn validate_pdf(path: &Path, size: u64) -> Result<(), String> {
    if size < MIN_PDF_SIZE {
        return Err(format!("too small for a PDF ({size} bytes)"));
    }
    let head = read_head(path).map_err(|e| format!("unreadable: {e}"))?;
    if head.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err("missing %PDF signature".to_string())
    }
}

fn validate_archive(path: &Path, size: u64) -> Result<(), String> {
    if size < MIN_FILE_SIZE {
        return Err(format!("too small for an archive ({size} bytes)"));
    }
    let file = File::open(path).map_err(|e| format!("unreadable: {e}"))?;
    zip::ZipArchive::new(file)
        .map(|_| ())
        .map_err(|e| format!("archive does not open: {e}"))
}
