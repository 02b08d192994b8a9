//! Categorical codes, normalization of scraped text, and per-document metadata.

mod codes;
mod model;
mod normalizer;
mod parser;

pub use codes::{
    CategoryCode, Discipline, DocumentType, Localisation, Serie, SessionCode, SessionKind, Subject,
};
pub use model::{DocumentMetadata, ExamEntry, ExamFile};
pub use normalizer::{
    SessionMatch, extract_session_kind, normalize_discipline, normalize_localisation,
    normalize_serie, normalize_session,
};
pub use parser::{parse_link, split_atl_name};
