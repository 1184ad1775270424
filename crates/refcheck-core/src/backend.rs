use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for binary-document text extraction backends.
///
/// Implementors return the document's text as it comes off the page; the
/// ingest crate turns that into numbered lines, and the parsing pipeline
/// (section location, segmentation, record extraction) lives in
/// `refcheck_parsing::ReferenceExtractor`.
pub trait DocumentBackend: Send + Sync {
    /// Extract the full text content of a document, pages separated by newlines.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}
