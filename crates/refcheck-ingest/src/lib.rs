use std::path::Path;

use thiserror::Error;

pub mod docx;

use refcheck_core::{SourceKind, TextLine};
use refcheck_parsing::{Extraction, ParsingError, ReferenceExtractor};

/// File extensions this crate can read (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("DOCX error: {0}")]
    Docx(#[from] docx::DocxError),
    #[error("text extraction error: {0}")]
    Backend(#[from] refcheck_core::BackendError),
    #[error("reference extraction error: {0}")]
    Parsing(#[from] ParsingError),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of refcheck-ingest)")]
    NoPdfSupport,
}

/// A document reduced to numbered lines.
#[derive(Debug, Clone)]
pub struct Document {
    pub lines: Vec<TextLine>,
    pub source: SourceKind,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension(path).as_str())
}

/// Split page text into lines: trimmed, empties dropped, numbered from 1.
pub fn lines_from_text(text: &str) -> Vec<TextLine> {
    TextLine::numbered(text.lines().map(str::trim).filter(|l| !l.is_empty()))
}

/// Read a document into lines.
///
/// Dispatches on file extension:
/// - `.docx` → one line per paragraph ([`SourceKind::Paragraphs`])
/// - `.txt` → text lines ([`SourceKind::PlainText`])
/// - `.pdf` → visual lines ([`SourceKind::Pdf`], requires the `pdf` feature)
pub fn load_document(path: &Path) -> Result<Document, IngestError> {
    let document = match extension(path).as_str() {
        "docx" => Document {
            lines: TextLine::numbered(docx::read_paragraphs(path)?),
            source: SourceKind::Paragraphs,
        },
        "txt" => Document {
            lines: lines_from_text(&std::fs::read_to_string(path)?),
            source: SourceKind::PlainText,
        },
        "pdf" => Document {
            lines: lines_from_text(&pdf_text(path)?),
            source: SourceKind::Pdf,
        },
        other => return Err(IngestError::Unsupported(other.to_string())),
    };

    tracing::debug!(
        path = %path.display(),
        lines = document.lines.len(),
        source = ?document.source,
        "document loaded"
    );
    Ok(document)
}

#[cfg(feature = "pdf")]
fn pdf_text(path: &Path) -> Result<String, IngestError> {
    use refcheck_core::DocumentBackend;

    let backend = refcheck_pdf_mupdf::MupdfBackend::default();
    Ok(backend.extract_text(path)?)
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(_path: &Path) -> Result<String, IngestError> {
    Err(IngestError::NoPdfSupport)
}

/// Load a document and run the extraction pipeline on it.
pub fn extract_references(
    path: &Path,
    extractor: &ReferenceExtractor,
) -> Result<Extraction, IngestError> {
    let document = load_document(path)?;
    Ok(extractor.extract(&document.lines, document.source)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_trimmed_and_renumbered() {
        let lines = lines_from_text("  References \n\n\t[1] A.\r\n   \n[2] B.");
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["References", "[1] A.", "[2] B."]);
        assert_eq!(lines[2].number, 3);
    }

    #[test]
    fn supported_extensions_ignore_case() {
        assert!(is_supported(Path::new("paper.PDF")));
        assert!(is_supported(Path::new("thesis.docx")));
        assert!(!is_supported(Path::new("refs.bib")));
        assert!(!is_supported(Path::new("README")));
    }

    #[test]
    fn unsupported_extension_is_reported() {
        let err = load_document(Path::new("refs.bib")).unwrap_err();
        assert!(matches!(err, IngestError::Unsupported(ext) if ext == "bib"));
    }
}
