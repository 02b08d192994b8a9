//! Filename sanitization and destination path resolution for downloads.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::metadata::DocumentMetadata;

/// Longest filename produced by [`sanitize_filename`], in bytes.
const MAX_FILENAME_BYTES: usize = 255;

/// Extension assumed until the real type of a body is known.
pub const PROVISIONAL_EXTENSION: &str = "pdf";

/// Which metadata fields become directory levels under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub by_year: bool,
    pub by_subject: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            by_year: true,
            by_subject: true,
        }
    }
}

/// Sanitizes a filename for filesystem safety.
///
/// Characters invalid on common filesystems (`< > : " / \ | ? *`) become `_`,
/// runs of whitespace and underscores collapse to one `_`, and leading or
/// trailing separators are stripped. Names longer than 255 characters are
/// truncated with their extension kept.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for ch in name.chars() {
        let mapped = match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
            }
            prev_sep = true;
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == ' ');

    if trimmed.is_empty() || !is_safe_filename_segment(trimmed) {
        return "download".to_string();
    }
    truncate_keeping_extension(trimmed)
}

fn truncate_keeping_extension(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < MAX_FILENAME_BYTES - 1 => {
            let stem = floor_char_boundary(stem, MAX_FILENAME_BYTES - ext.len() - 1);
            format!("{stem}.{ext}")
        }
        _ => floor_char_boundary(name, MAX_FILENAME_BYTES).to_string(),
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn floor_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let end = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    &s[..end]
}

fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Lowercased extension of `name` without the dot, if it has one.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty() && ext.len() <= 8 && !ext.contains(['/', '\\']))
        .then(|| ext.to_ascii_lowercase())
}

/// Filename for a job: the metadata filename, else a name built from the
/// metadata, else the URL's last path segment. A name without extension gets
/// the provisional `.pdf`.
#[must_use]
pub fn job_filename(url: &str, metadata: &DocumentMetadata) -> String {
    let raw = metadata
        .filename
        .clone()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| has_naming_fields(metadata).then(|| metadata.organized_filename()))
        .or_else(|| last_url_segment(url))
        .unwrap_or_else(|| "download".to_string());

    let name = sanitize_filename(&raw);
    if extension_of(&name).is_some() {
        name
    } else {
        format!("{name}.{PROVISIONAL_EXTENSION}")
    }
}

fn has_naming_fields(metadata: &DocumentMetadata) -> bool {
    metadata.year.is_some() || metadata.subject_dir().is_some() || metadata.file_id.is_some()
}

fn last_url_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
    (!decoded.is_empty()).then_some(decoded)
}

/// Directory a job's file is written into: `root[/year][/subject]`.
#[must_use]
pub fn destination_dir(root: &Path, metadata: &DocumentMetadata, layout: Layout) -> PathBuf {
    let mut dir = root.to_path_buf();
    if layout.by_year
        && let Some(year) = metadata.year
    {
        dir.push(year.to_string());
    }
    if layout.by_subject
        && let Some(subject) = metadata.subject_dir()
    {
        dir.push(sanitize_filename(&subject));
    }
    dir
}

/// Full provisional destination for a job.
#[must_use]
pub fn destination_path(
    root: &Path,
    url: &str,
    metadata: &DocumentMetadata,
    layout: Layout,
) -> PathBuf {
    destination_dir(root, metadata, layout).join(job_filename(url, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Discipline, Subject};

    // ==================== Sanitization ====================

    #[test]
    fn test_sanitize_filename_replaces_invalid_chars() {
        assert_eq!(sanitize_filename("Sujet : Maths 2023.pdf"), "Sujet_Maths_2023.pdf");
        assert_eq!(sanitize_filename("a/b\\c|d?.pdf"), "a_b_c_d_.pdf");
        assert_eq!(sanitize_filename("  __x__  "), "x");
    }

    #[test]
    fn test_sanitize_filename_keeps_accents() {
        assert_eq!(sanitize_filename("Français dictée.pdf"), "Français_dictée.pdf");
    }

    #[test]
    fn test_sanitize_filename_rejects_traversal() {
        assert_eq!(sanitize_filename(".."), "download");
        assert_eq!(sanitize_filename("."), "download");
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
    }

    #[test]
    fn test_sanitize_filename_truncates_keeping_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), 255);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_sanitize_filename_truncates_on_bytes_at_char_boundary() {
        // 'é' is two bytes, so 200 of them are 400 bytes.
        let long = format!("{}.pdf", "é".repeat(200));
        let out = sanitize_filename(&long);
        assert!(out.len() <= 255, "{} bytes", out.len());
        assert!(out.ends_with(".pdf"));
        assert_eq!(out, format!("{}.pdf", "é".repeat(125)));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive.tar.zip").as_deref(), Some("zip"));
        assert_eq!(extension_of("download"), None);
        assert_eq!(extension_of(".hidden"), None);
    }

    // ==================== Destination ====================

    #[test]
    fn test_job_filename_prefers_metadata_filename() {
        let meta = DocumentMetadata {
            filename: Some("sujet maths.pdf".to_string()),
            ..DocumentMetadata::default()
        };
        assert_eq!(
            job_filename("https://example.com/document/1/download", &meta),
            "sujet_maths.pdf"
        );
    }

    #[test]
    fn test_job_filename_builds_from_fields() {
        let meta = DocumentMetadata {
            year: Some(2022),
            file_id: Some("12".to_string()),
            ..DocumentMetadata::default()
        };
        assert_eq!(
            job_filename("https://example.com/document/1/download", &meta),
            "2022_SUJET_12.pdf"
        );
    }

    #[test]
    fn test_job_filename_falls_back_to_url_with_provisional_extension() {
        let meta = DocumentMetadata::default();
        assert_eq!(
            job_filename("https://example.com/document/1/download", &meta),
            "download.pdf"
        );
        assert_eq!(
            job_filename("https://example.com/files/annexe.docx", &meta),
            "annexe.docx"
        );
    }

    #[test]
    fn test_destination_path_organizes_by_year_and_subject() {
        let meta = DocumentMetadata {
            filename: Some("a.pdf".to_string()),
            year: Some(2024),
            discipline: Some(Discipline::Mathematiques),
            subject: Some(Subject::Francais),
            ..DocumentMetadata::default()
        };
        let path = destination_path(Path::new("/out"), "https://x/y", &meta, Layout::default());
        assert_eq!(path, PathBuf::from("/out/2024/MATHEMATIQUES/a.pdf"));

        let flat = Layout {
            by_year: false,
            by_subject: false,
        };
        let path = destination_path(Path::new("/out"), "https://x/y", &meta, flat);
        assert_eq!(path, PathBuf::from("/out/a.pdf"));
    }

    #[test]
    fn test_destination_dir_skips_missing_fields() {
        let meta = DocumentMetadata {
            subject: Some(Subject::Svt),
            ..DocumentMetadata::default()
        };
        let dir = destination_dir(Path::new("/out"), &meta, Layout::default());
        assert_eq!(dir, PathBuf::from("/out/Sciences_(SVT)"));
    }
}
