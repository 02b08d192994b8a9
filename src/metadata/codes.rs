//! Closed sets of categorical codes used to classify exam documents.
//!
//! Every categorical field carried through the crate is one of these codes or
//! `None`; raw scraped text never travels past the normalizer.

use std::fmt;

use serde::{Serialize, Serializer};

/// A closed enumeration of short, filename-friendly codes.
pub trait CategoryCode: Sized + Copy + 'static {
    /// Every member of the enumeration.
    const ALL: &'static [Self];

    /// The canonical `UPPER_SNAKE_CASE` code.
    fn as_code(self) -> &'static str;

    /// Looks up a canonical code, ignoring case and surrounding whitespace.
    #[must_use]
    fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_code().eq_ignore_ascii_case(code))
    }
}

macro_rules! category_code {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl CategoryCode for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_code())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_code())
            }
        }
    };
}

category_code! {
    /// Exam session kind.
    SessionKind {
        /// Regular June session.
        Normal => "NORMAL",
        /// Replacement (September) session.
        Remplacement => "REMPLACEMENT",
    }
}

category_code! {
    /// Exam series.
    Serie {
        Generale => "GENERALE",
        Professionnelle => "PROFESSIONNELLE",
    }
}

category_code! {
    /// Exam centre localisation.
    Localisation {
        AmNorth => "AM_NORTH",
        AmSouth => "AM_SOUTH",
        AntilGuy => "ANTIL_GUY",
        Asia => "ASIA",
        Metropole => "METROPOLE",
        Polynesie => "POLYNESIE",
    }
}

category_code! {
    /// Exam discipline.
    Discipline {
        FrDictee => "FR_DICTEE",
        Francais => "FRANCAIS",
        Mathematiques => "MATHEMATIQUES",
        HistGeoEmc => "HIST_GEO_EMC",
        Sciences => "SCIENCES",
        LangueVivante => "LANGUE_VIVANTE",
    }
}

category_code! {
    /// Whether a document is the exam paper itself or its correction.
    #[derive(Default)]
    DocumentType {
        #[default]
        Sujet => "SUJET",
        Correction => "CORRECTION",
    }
}

/// Subject labels recognized in filenames and URLs.
///
/// Used to organize downloads into per-subject directories when no discipline
/// code is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    Mathematiques,
    Francais,
    HistoireGeographie,
    Sciences,
    Svt,
    PhysiqueChimie,
    Technologie,
    Anglais,
    Allemand,
    Espagnol,
    Italien,
}

impl Subject {
    /// Human-readable label, also used as directory name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mathematiques => "Mathématiques",
            Self::Francais => "Français",
            Self::HistoireGeographie => "Histoire-Géographie",
            Self::Sciences => "Sciences",
            Self::Svt => "Sciences (SVT)",
            Self::PhysiqueChimie => "Sciences (Physique-Chimie)",
            Self::Technologie => "Sciences (Technologie)",
            Self::Anglais => "Anglais LV1",
            Self::Allemand => "Allemand LV1",
            Self::Espagnol => "Espagnol LV1",
            Self::Italien => "Italien LV1",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Subject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A complete session code such as `2024_NORMAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionCode {
    year: u16,
    kind: SessionKind,
}

impl SessionCode {
    #[must_use]
    pub fn new(year: u16, kind: SessionKind) -> Self {
        Self { year, kind }
    }

    #[must_use]
    pub fn year(self) -> u16 {
        self.year
    }

    #[must_use]
    pub fn kind(self) -> SessionKind {
        self.kind
    }

    /// Parses a canonical `<year>_<KIND>` code.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let (year, kind) = code.trim().split_once('_')?;
        if year.len() != 4 || !year.starts_with("20") {
            return None;
        }
        let year = year.parse().ok()?;
        let kind = SessionKind::from_code(kind)?;
        Some(Self { year, kind })
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.year, self.kind)
    }
}

impl Serialize for SessionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_is_case_insensitive() {
        assert_eq!(Serie::from_code("generale"), Some(Serie::Generale));
        assert_eq!(
            Localisation::from_code(" am_north "),
            Some(Localisation::AmNorth)
        );
        assert_eq!(Discipline::from_code("FR_DICTEE"), Some(Discipline::FrDictee));
    }

    #[test]
    fn test_document_type_defaults_to_sujet() {
        assert_eq!(DocumentType::default(), DocumentType::Sujet);
    }

    #[test]
    fn test_from_code_unknown_returns_none() {
        assert_eq!(Serie::from_code("technologique"), None);
        assert_eq!(DocumentType::from_code(""), None);
    }

    #[test]
    fn test_session_code_display_and_parse() {
        let code = SessionCode::new(2024, SessionKind::Normal);
        assert_eq!(code.to_string(), "2024_NORMAL");
        assert_eq!(SessionCode::parse("2024_NORMAL"), Some(code));
        assert_eq!(
            SessionCode::parse("2019_remplacement"),
            Some(SessionCode::new(2019, SessionKind::Remplacement))
        );
    }

    #[test]
    fn test_session_code_parse_rejects_garbage() {
        assert_eq!(SessionCode::parse("24_NORMAL"), None);
        assert_eq!(SessionCode::parse("2024"), None);
        assert_eq!(SessionCode::parse("2024_JUIN"), None);
        assert_eq!(SessionCode::parse("1999_NORMAL"), None);
    }

    #[test]
    fn test_codes_serialize_as_strings() {
        let json = serde_json::to_string(&SessionCode::new(2023, SessionKind::Remplacement)).unwrap();
        assert_eq!(json, "\"2023_REMPLACEMENT\"");
        let json = serde_json::to_string(&Localisation::AntilGuy).unwrap();
        assert_eq!(json, "\"ANTIL_GUY\"");
        let json = serde_json::to_string(&Subject::Svt).unwrap();
        assert_eq!(json, "\"Sciences (SVT)\"");
    }
}
