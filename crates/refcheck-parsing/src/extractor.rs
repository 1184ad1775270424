use refcheck_core::normalize::{Strictness, collapse_whitespace, normalize};
use refcheck_core::{CitationStyle, ReferenceRecord, ReferenceSection, SourceKind, TextLine};

use crate::config::ParsingConfig;
use crate::style::{detect_style, rules_for};
use crate::{ParsingError, identifiers, section, segment};

/// Output of the extraction pipeline for one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub section: ReferenceSection,
    /// Every segmented record in document order, titled or not.
    pub records: Vec<ReferenceRecord>,
}

impl Extraction {
    /// Records with a title; these are the ones worth looking up.
    pub fn titled(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.iter().filter(|r| r.title.is_some())
    }

    /// Records whose title could not be extracted.
    pub fn unextractable(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.iter().filter(|r| r.title.is_none())
    }

    pub fn count_by_style(&self, style: CitationStyle) -> usize {
        self.records.iter().filter(|r| r.style == style).count()
    }
}

/// A configurable reference extraction pipeline.
///
/// Holds a [`ParsingConfig`] and exposes each step as a method: locate the
/// section, segment it, then turn each segment into a [`ReferenceRecord`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceExtractor {
    config: ParsingConfig,
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParsingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    /// Locate the reference section (step 1).
    ///
    /// With `whole_document_fallback` enabled a missing heading is not an
    /// error; the whole document becomes the section.
    pub fn find_section(&self, lines: &[TextLine]) -> Result<ReferenceSection, ParsingError> {
        match section::locate_section(lines, &self.config) {
            Ok(found) => Ok(found),
            Err(ParsingError::SectionNotFound) if self.config.whole_document_fallback => {
                tracing::warn!(
                    lines = lines.len(),
                    "no reference heading found, treating the whole document as the reference section"
                );
                Ok(section::whole_document(lines))
            }
            Err(e) => Err(e),
        }
    }

    /// Segment a section into one string per citation (step 2).
    pub fn segment(&self, section: &ReferenceSection, source: SourceKind) -> Vec<String> {
        segment::segment(&section.lines, source, &self.config)
    }

    /// Build a record from one segmented string (step 3).
    ///
    /// Style and title come from the light-normalized text; the DOI is taken
    /// from the raw text. A title with nothing comparable left after strict
    /// normalization counts as unextractable.
    pub fn extract_record(&self, text: &str) -> ReferenceRecord {
        let raw_text = collapse_whitespace(text);
        let light = normalize(&raw_text, Strictness::Light);

        let style = detect_style(&light, self.config.styles());
        let title = rules_for(style)
            .and_then(|rules| rules.extract_title(&light))
            .filter(|t| !normalize(t, Strictness::Strict).is_empty());
        let doi = identifiers::extract_doi(&raw_text);

        ReferenceRecord {
            raw_text,
            style,
            title,
            doi,
        }
    }

    /// Run the full pipeline on a document's lines.
    pub fn extract(
        &self,
        lines: &[TextLine],
        source: SourceKind,
    ) -> Result<Extraction, ParsingError> {
        let section = self.find_section(lines)?;
        let records: Vec<ReferenceRecord> = self
            .segment(&section, source)
            .iter()
            .map(|text| self.extract_record(text))
            .collect();

        let untitled = records.iter().filter(|r| r.title.is_none()).count();
        tracing::info!(
            method = section.detection.as_str(),
            records = records.len(),
            untitled,
            "references extracted"
        );

        Ok(Extraction { section, records })
    }
}
