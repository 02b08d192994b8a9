//! Typed records passed between the crawl and download stages.

use serde::Serialize;

use super::codes::{
    CategoryCode, Discipline, DocumentType, Localisation, Serie, SessionCode, SessionKind, Subject,
};
use crate::download::sanitize_filename;

/// Fixed-shape metadata attached to a download job and its records.
///
/// Every field is optional; an unclassified document is still downloadable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Original filename, usually from the `data-atl-name` sidecar tag.
    pub filename: Option<String>,
    /// Catalog file identifier from the sidecar tag.
    pub file_id: Option<String>,
    pub year: Option<u16>,
    pub subject: Option<Subject>,
    pub discipline: Option<Discipline>,
    pub session_kind: Option<SessionKind>,
    pub serie: Option<Serie>,
    pub localisation: Option<Localisation>,
    pub document_type: DocumentType,
    pub is_correction: bool,
}

impl DocumentMetadata {
    /// The combined session code, when both year and kind are known.
    #[must_use]
    pub fn session_code(&self) -> Option<SessionCode> {
        Some(SessionCode::new(self.year?, self.session_kind?))
    }

    /// Directory label for per-subject organization.
    ///
    /// A discipline code wins over a filename-derived subject.
    #[must_use]
    pub fn subject_dir(&self) -> Option<String> {
        self.discipline
            .map(|d| d.as_code().to_string())
            .or_else(|| self.subject.map(|s| s.label().to_string()))
    }

    /// Builds a filename from the metadata fields, falling back on the original
    /// filename when one is known.
    #[must_use]
    pub fn organized_filename(&self) -> String {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if let Some(subject) = self.subject_dir() {
            parts.push(subject);
        }
        if let Some(kind) = self.session_kind {
            parts.push(kind.as_code().to_string());
        }
        if let Some(serie) = self.serie {
            parts.push(serie.as_code().to_string());
        }
        if let Some(localisation) = self.localisation {
            parts.push(localisation.as_code().to_string());
        }
        parts.push(self.document_type.as_code().to_string());
        if let Some(id) = &self.file_id {
            parts.push(id.clone());
        }

        format!("{}.pdf", sanitize_filename(&parts.join("_")))
    }
}

/// One downloadable file of a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamFile {
    pub filename: Option<String>,
    pub download_url: String,
    pub file_id: Option<String>,
    pub is_correction: bool,
}

/// One catalog row with its classified columns and files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamEntry {
    /// Row number in discovery order, starting at 1.
    pub id: usize,
    pub session: Option<SessionCode>,
    pub discipline: Option<Discipline>,
    pub serie: Option<Serie>,
    pub localisation: Option<Localisation>,
    files: Vec<ExamFile>,
}

impl ExamEntry {
    #[must_use]
    pub fn new(
        id: usize,
        session: Option<SessionCode>,
        discipline: Option<Discipline>,
        serie: Option<Serie>,
        localisation: Option<Localisation>,
    ) -> Self {
        Self {
            id,
            session,
            discipline,
            serie,
            localisation,
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn files(&self) -> &[ExamFile] {
        &self.files
    }

    pub fn push_file(&mut self, file: ExamFile) {
        self.files.push(file);
    }

    /// True when all four categorical columns resolved.
    #[must_use]
    pub fn is_fully_classified(&self) -> bool {
        self.session.is_some()
            && self.discipline.is_some()
            && self.serie.is_some()
            && self.localisation.is_some()
    }

    /// Filename stem used when saving `file`, built from the row's codes.
    #[must_use]
    pub fn save_name(&self, file: &ExamFile) -> Option<String> {
        let session = self.session?;
        let discipline = self.discipline?;
        let mut parts = vec![session.to_string(), discipline.as_code().to_string()];
        if let Some(serie) = self.serie {
            parts.push(serie.as_code().to_string());
        }
        if let Some(localisation) = self.localisation {
            parts.push(localisation.as_code().to_string());
        }
        parts.push(document_type(file.is_correction).as_code().to_string());
        if let Some(id) = &file.file_id {
            parts.push(id.clone());
        }
        Some(parts.join("_"))
    }

    /// Download metadata for one of this row's files.
    #[must_use]
    pub fn metadata_for(&self, file: &ExamFile) -> DocumentMetadata {
        let extension = file
            .filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map_or("pdf", |(_, ext)| ext);
        DocumentMetadata {
            filename: self
                .save_name(file)
                .map(|stem| format!("{stem}.{extension}"))
                .or_else(|| file.filename.clone()),
            file_id: file.file_id.clone(),
            year: self.session.map(SessionCode::year),
            subject: None,
            discipline: self.discipline,
            session_kind: self.session.map(SessionCode::kind),
            serie: self.serie,
            localisation: self.localisation,
            document_type: document_type(file.is_correction),
            is_correction: file.is_correction,
        }
    }
}

fn document_type(is_correction: bool) -> DocumentType {
    if is_correction {
        DocumentType::Correction
    } else {
        DocumentType::Sujet
    }
}
