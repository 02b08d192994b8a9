//! Metadata extraction from a document link and its `data-atl-name` tag.
//!
//! The tag has the shape `"<filename>|<file id>"`, for example
//! `"24genfrdag1_v11.pdf|63414"`. Year, subject, session kind, serie and the
//! correction flag are inferred from the decoded URL and filename together.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::codes::{DocumentType, Serie, SessionKind, Subject};
use super::model::DocumentMetadata;

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("metadata parser regex is valid") // Static pattern, safe to panic
}

static LEADING_YEAR: LazyLock<Regex> = LazyLock::new(|| pattern(r"^([0-9]{2})"));
static FULL_YEAR: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(20[0-2][0-9])\b"));

/// Subject keywords, matched on word boundaries in this order.
static SUBJECT_KEYWORDS: LazyLock<Vec<(Regex, Subject)>> = LazyLock::new(|| {
    [
        ("mathematiques", Subject::Mathematiques),
        ("maths", Subject::Mathematiques),
        ("francais", Subject::Francais),
        ("histoire", Subject::HistoireGeographie),
        ("geographie", Subject::HistoireGeographie),
        ("histoire-geographie", Subject::HistoireGeographie),
        ("sciences", Subject::Sciences),
        ("svt", Subject::Svt),
        ("physique", Subject::PhysiqueChimie),
        ("chimie", Subject::PhysiqueChimie),
        ("technologie", Subject::Technologie),
        ("anglais", Subject::Anglais),
        ("allemand", Subject::Allemand),
        ("espagnol", Subject::Espagnol),
        ("italien", Subject::Italien),
    ]
    .into_iter()
    .map(|(key, subject)| (pattern(&format!(r"\b{}\b", regex::escape(key))), subject))
    .collect()
});

static SUBJECT_COMBOS: LazyLock<Vec<(Regex, Subject)>> = LazyLock::new(|| {
    vec![
        (
            pattern(r"\bhist(?:oire)?[-_]?geo(?:graphie)?\b"),
            Subject::HistoireGeographie,
        ),
        (
            pattern(r"\bphys(?:ique)?[-_]?chim(?:ie)?\b"),
            Subject::PhysiqueChimie,
        ),
    ]
});

/// Session cues in priority order.
static SESSION_CUES: LazyLock<Vec<(Regex, SessionKind)>> = LazyLock::new(|| {
    vec![
        (pattern(r"\bnormale\b"), SessionKind::Normal),
        (pattern(r"\bremplacement\b"), SessionKind::Remplacement),
        (pattern(r"\bseptembre\b"), SessionKind::Remplacement),
        (pattern(r"\bjuin\b"), SessionKind::Normal),
    ]
});

static SERIE_PRO: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(?:professionnelle|pro)\b"));
static SERIE_GENERALE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(?:generale|gen)\b"));

const CORRECTION_KEYWORDS: &[&str] = &[
    "corrig",
    "correction",
    "corrige",
    "reponses",
    "solutions",
    "answer",
    "key",
];

/// Splits a `data-atl-name` tag into `(filename, file id)`.
///
/// Empty parts are `None`.
#[must_use]
pub fn split_atl_name(tag: &str) -> (Option<String>, Option<String>) {
    let mut parts = tag.split('|').map(str::trim);
    let non_empty = |part: Option<&str>| part.filter(|p| !p.is_empty()).map(str::to_string);
    let filename = non_empty(parts.next());
    let file_id = non_empty(parts.next());
    (filename, file_id)
}

/// Derives [`DocumentMetadata`] from a download URL and its optional sidecar tag.
///
/// When the tag carries no filename, the last URL path segment is used if it
/// looks like a filename (contains a dot).
#[must_use]
pub fn parse_link(url: &str, atl_name: Option<&str>) -> DocumentMetadata {
    let (tag_filename, file_id) = atl_name.map(split_atl_name).unwrap_or_default();
    let filename = tag_filename.or_else(|| filename_from_url(url));

    let decoded_filename = filename.as_deref().map(decode).unwrap_or_default();
    let decoded_url = decode(url);
    let text = format!("{decoded_url} {decoded_filename}").to_lowercase();

    let is_correction = is_correction(&text);
    let metadata = DocumentMetadata {
        year: extract_year(&decoded_filename, &text),
        subject: extract_subject(&text),
        discipline: None,
        session_kind: extract_session_kind(&text),
        serie: extract_serie(&text),
        localisation: None,
        document_type: if is_correction {
            DocumentType::Correction
        } else {
            DocumentType::Sujet
        },
        is_correction,
        filename,
        file_id,
    };

    debug!(url, ?metadata, "Parsed link metadata");
    metadata
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned())
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.trim();
    (last.contains('.') && !last.starts_with('.')).then(|| last.to_string())
}

fn extract_year(filename: &str, text: &str) -> Option<u16> {
    if let Some(caps) = LEADING_YEAR.captures(filename) {
        return caps[1].parse::<u16>().ok().map(|short| 2000 + short);
    }
    FULL_YEAR
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn extract_subject(text: &str) -> Option<Subject> {
    SUBJECT_KEYWORDS
        .iter()
        .chain(SUBJECT_COMBOS.iter())
        .find(|(re, _)| re.is_match(text))
        .map(|(_, subject)| *subject)
}

fn extract_session_kind(text: &str) -> Option<SessionKind> {
    SESSION_CUES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, kind)| *kind)
}

fn extract_serie(text: &str) -> Option<Serie> {
    if SERIE_PRO.is_match(text) {
        Some(Serie::Professionnelle)
    } else if SERIE_GENERALE.is_match(text) {
        Some(Serie::Generale)
    } else {
        None
    }
}

fn is_correction(text: &str) -> bool {
    CORRECTION_KEYWORDS.iter().any(|kw| text.contains(kw))
}
