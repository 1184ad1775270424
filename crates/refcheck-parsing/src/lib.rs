use thiserror::Error;

pub mod config;
pub mod extractor;
pub mod identifiers;
pub mod section;
pub mod segment;
pub mod style;

pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::{Extraction, ReferenceExtractor};
pub use style::{StyleRules, detect_style, rules_for};
// Re-export domain types from core (canonical definitions live there)
pub use refcheck_core::{
    CitationStyle, DetectionMethod, ReferenceRecord, ReferenceSection, SourceKind, TextLine,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("no reference section found")]
    SectionNotFound,
    #[error("invalid parsing config: {0}")]
    InvalidConfig(String),
}

/// Locate, segment and extract the references of a line sequence with the
/// default configuration.
pub fn extract_references(
    lines: &[TextLine],
    source: SourceKind,
) -> Result<Extraction, ParsingError> {
    ReferenceExtractor::new().extract(lines, source)
}
