//! Normalization of raw scraped catalog text into categorical codes.
//!
//! Each function is total: it trims and lowercases its input, checks for an
//! already-canonical code, then a table of known phrasings, then ordered regex
//! fallbacks. A miss is `None`, never an error.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::codes::{CategoryCode, Discipline, Localisation, Serie, SessionCode, SessionKind};

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("normalizer regex is valid") // Static pattern, safe to panic
}

static YEAR_FULL: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(20[0-9]{2})\b"));
static YEAR_LEADING: LazyLock<Regex> = LazyLock::new(|| pattern(r"^([0-9]{2})"));
static KIND_NORMAL: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b(?:normal|normale|normales|normaux|juin|june)\b"));
static KIND_REPLACEMENT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"\b(?:remplacement|remplacements|rempl|septembre|september|sept)\b")
});

static SERIE_FALLBACKS: LazyLock<Vec<(Regex, Serie)>> = LazyLock::new(|| {
    vec![
        (pattern(r"\b(?:g[ée]n[ée]rales?|g[ée]n)\b"), Serie::Generale),
        (
            pattern(r"\b(?:professionnelles?|professionnel|pro)\b"),
            Serie::Professionnelle,
        ),
    ]
});

static LOCALISATION_FALLBACKS: LazyLock<Vec<(Regex, Localisation)>> = LazyLock::new(|| {
    vec![
        (
            pattern(r"\bam[ée]r(?:ique)?\.?\s*(?:du\s+)?nord\b"),
            Localisation::AmNorth,
        ),
        (
            pattern(r"\bam[ée]r(?:ique)?\.?\s*(?:du\s+)?sud\b"),
            Localisation::AmSouth,
        ),
        (pattern(r"\b(?:antilles?|guyane)\b"), Localisation::AntilGuy),
        (pattern(r"\b(?:asie|asia)\b"), Localisation::Asia),
        (pattern(r"\bm[ée]tropol"), Localisation::Metropole),
        (pattern(r"\bpolyn[ée]sie\b"), Localisation::Polynesie),
    ]
});

static DICTEE_FRENCH: LazyLock<Regex> = LazyLock::new(|| pattern(r"fran[cç]"));
static DICTEE_WORD: LazyLock<Regex> = LazyLock::new(|| pattern(r"dict"));

static DISCIPLINE_FALLBACKS: LazyLock<Vec<(Regex, Discipline)>> = LazyLock::new(|| {
    vec![
        (pattern(r"\b(?:fran[cç]ais|fr)\b"), Discipline::Francais),
        (pattern(r"\bmath"), Discipline::Mathematiques),
        (
            pattern(r"\b(?:hist|histoire|g[ée]o|g[ée]ographie|emc)\b|\bhist(?:oire)?[-_ ]?g[ée]o"),
            Discipline::HistGeoEmc,
        ),
        (
            pattern(r"\b(?:sciences?|svt|physique|chimie|technologie|techno)\b"),
            Discipline::Sciences,
        ),
        (
            pattern(
                r"\b(?:langues?\s+vivantes?|lv[12]|anglais|allemand|espagnol|italien)\b",
            ),
            Discipline::LangueVivante,
        ),
    ]
});

const LOCALISATION_TABLE: &[(&str, Localisation)] = &[
    ("amérique du nord", Localisation::AmNorth),
    ("amerique du nord", Localisation::AmNorth),
    ("amérique du sud", Localisation::AmSouth),
    ("amerique du sud", Localisation::AmSouth),
    ("antilles, guyane", Localisation::AntilGuy),
    ("antilles , guyane", Localisation::AntilGuy),
    ("antilles guyane", Localisation::AntilGuy),
    ("antilles-guyane", Localisation::AntilGuy),
    ("asie", Localisation::Asia),
    ("métropole", Localisation::Metropole),
    ("metropole", Localisation::Metropole),
    ("france métropolitaine", Localisation::Metropole),
    ("polynésie", Localisation::Polynesie),
    ("polynesie", Localisation::Polynesie),
    ("polynésie française", Localisation::Polynesie),
];

const SERIE_TABLE: &[(&str, Serie)] = &[
    ("générale", Serie::Generale),
    ("generale", Serie::Generale),
    ("série générale", Serie::Generale),
    ("serie generale", Serie::Generale),
    ("professionnelle", Serie::Professionnelle),
    ("série professionnelle", Serie::Professionnelle),
    ("serie professionnelle", Serie::Professionnelle),
];

const DISCIPLINE_TABLE: &[(&str, Discipline)] = &[
    ("français - dictée", Discipline::FrDictee),
    ("francais - dictee", Discipline::FrDictee),
    ("français dictée", Discipline::FrDictee),
    ("dictée", Discipline::FrDictee),
    ("français", Discipline::Francais),
    ("francais", Discipline::Francais),
    ("mathématiques", Discipline::Mathematiques),
    ("mathematiques", Discipline::Mathematiques),
    ("maths", Discipline::Mathematiques),
    ("histoire-géographie", Discipline::HistGeoEmc),
    ("histoire-géographie-emc", Discipline::HistGeoEmc),
    ("histoire géographie enseignement moral et civique", Discipline::HistGeoEmc),
    ("sciences", Discipline::Sciences),
    ("langues vivantes", Discipline::LangueVivante),
    ("langue vivante étrangère", Discipline::LangueVivante),
];

const SESSION_KIND_TABLE: &[(&str, SessionKind)] = &[
    ("session normale", SessionKind::Normal),
    ("épreuves normales", SessionKind::Normal),
    ("session de remplacement", SessionKind::Remplacement),
    ("épreuves de remplacement", SessionKind::Remplacement),
];

/// Outcome of session normalization.
///
/// The year and the session kind are resolved independently; only when both
/// resolve is a [`SessionCode`] produced. Partial results are kept distinct so
/// callers can tell "half classified" from "not classified at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMatch {
    /// Both the year and the kind resolved.
    Complete(SessionCode),
    /// Only a year token was found.
    YearOnly(u16),
    /// Only a session kind token was found.
    KindOnly(SessionKind),
    /// Nothing recognizable.
    Unmatched,
}

impl SessionMatch {
    fn from_parts(year: Option<u16>, kind: Option<SessionKind>) -> Self {
        match (year, kind) {
            (Some(year), Some(kind)) => Self::Complete(SessionCode::new(year, kind)),
            (Some(year), None) => Self::YearOnly(year),
            (None, Some(kind)) => Self::KindOnly(kind),
            (None, None) => Self::Unmatched,
        }
    }

    /// The combined code, present only for [`SessionMatch::Complete`].
    #[must_use]
    pub fn code(self) -> Option<SessionCode> {
        match self {
            Self::Complete(code) => Some(code),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(self) -> Option<SessionKind> {
        match self {
            Self::Complete(code) => Some(code.kind()),
            Self::KindOnly(kind) => Some(kind),
            Self::YearOnly(_) | Self::Unmatched => None,
        }
    }

    #[must_use]
    pub fn year(self) -> Option<u16> {
        match self {
            Self::Complete(code) => Some(code.year()),
            Self::YearOnly(year) => Some(year),
            Self::KindOnly(_) | Self::Unmatched => None,
        }
    }

    #[must_use]
    pub fn is_partial(self) -> bool {
        matches!(self, Self::YearOnly(_) | Self::KindOnly(_))
    }
}

/// Normalizes session text such as `"2024 - épreuves normales"`.
#[must_use]
pub fn normalize_session(text: &str) -> SessionMatch {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return SessionMatch::Unmatched;
    }
    if let Some(code) = SessionCode::parse(&t) {
        return SessionMatch::Complete(code);
    }

    let result = SessionMatch::from_parts(extract_year(&t), extract_session_kind(&t));
    trace!(input = %text, ?result, "normalized session");
    result
}

fn extract_year(t: &str) -> Option<u16> {
    if let Some(caps) = YEAR_FULL.captures(t) {
        return caps[1].parse().ok();
    }
    let caps = YEAR_LEADING.captures(t)?;
    caps[1].parse::<u16>().ok().map(|short| 2000 + short)
}

/// Resolves the session kind alone (normal vs replacement) from free text.
#[must_use]
pub fn extract_session_kind(text: &str) -> Option<SessionKind> {
    let t = text.trim().to_lowercase();
    if let Some(kind) = SessionKind::from_code(&t) {
        return Some(kind);
    }
    if let Some(kind) = lookup(SESSION_KIND_TABLE, &t) {
        return Some(kind);
    }
    if KIND_NORMAL.is_match(&t) {
        Some(SessionKind::Normal)
    } else if KIND_REPLACEMENT.is_match(&t) {
        Some(SessionKind::Remplacement)
    } else {
        None
    }
}

/// Normalizes serie text such as `"Série générale"`.
#[must_use]
pub fn normalize_serie(text: &str) -> Option<Serie> {
    classify(text, SERIE_TABLE, &SERIE_FALLBACKS)
}

/// Normalizes localisation text such as `"Amérique du Nord"`.
#[must_use]
pub fn normalize_localisation(text: &str) -> Option<Localisation> {
    classify(text, LOCALISATION_TABLE, &LOCALISATION_FALLBACKS)
}

/// Normalizes discipline text such as `"Français - dictée"`.
#[must_use]
pub fn normalize_discipline(text: &str) -> Option<Discipline> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    if let Some(code) = Discipline::from_code(&t) {
        return Some(code);
    }
    if let Some(code) = lookup(DISCIPLINE_TABLE, &t) {
        return Some(code);
    }
    // A dictation is also a French paper; it must win over the generic French match.
    if DICTEE_FRENCH.is_match(&t) && DICTEE_WORD.is_match(&t) {
        return Some(Discipline::FrDictee);
    }
    first_match(&DISCIPLINE_FALLBACKS, &t)
}

fn classify<C: CategoryCode>(text: &str, table: &[(&str, C)], fallbacks: &[(Regex, C)]) -> Option<C> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    C::from_code(&t)
        .or_else(|| lookup(table, &t))
        .or_else(|| first_match(fallbacks, &t))
}

fn lookup<C: Copy>(table: &[(&str, C)], key: &str) -> Option<C> {
    table
        .iter()
        .find_map(|(phrase, code)| (*phrase == key).then_some(*code))
}

fn first_match<C: Copy>(fallbacks: &[(Regex, C)], t: &str) -> Option<C> {
    fallbacks
        .iter()
        .find_map(|(re, code)| re.is_match(t).then_some(*code))
}
