use std::path::Path;

use mupdf::{Document, Rect, TextPageFlags};

use refcheck_core::{BackendError, DocumentBackend};

/// MuPDF-based implementation of [`DocumentBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so that the
/// docx and plain-text paths build without it.
///
/// Text blocks lying in the top or bottom margin band of a page are
/// dropped. Running headers and page footers otherwise land in the middle
/// of a reference that crosses a page break.
pub struct MupdfBackend {
    /// Fraction of page height, from the top, treated as header. `None` keeps it.
    header_ratio: Option<f32>,
    /// Fraction of page height, from the bottom, treated as footer. `None` keeps it.
    footer_ratio: Option<f32>,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            header_ratio: Some(0.04),
            footer_ratio: Some(0.05),
        }
    }
}

/// Vertical band of a page whose blocks are kept.
struct Band {
    top: Option<f32>,
    bottom: Option<f32>,
}

impl Band {
    fn keeps(&self, block: &Rect) -> bool {
        let below_header = self.top.is_none_or(|t| block.y1 > t);
        let above_footer = self.bottom.is_none_or(|b| block.y0 < b);
        below_header && above_footer
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every block, margins included.
    pub fn without_margins() -> Self {
        Self {
            header_ratio: None,
            footer_ratio: None,
        }
    }

    /// Header band height as a fraction of the page. `0.0` disables it.
    pub fn with_header_ratio(mut self, ratio: f32) -> Self {
        self.header_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Footer band height as a fraction of the page. `0.0` disables it.
    pub fn with_footer_ratio(mut self, ratio: f32) -> Self {
        self.footer_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    fn band(&self, page: &Rect) -> Band {
        let height = page.y1 - page.y0;
        Band {
            top: self.header_ratio.map(|r| page.y0 + height * r),
            bottom: self.footer_ratio.map(|r| page.y1 - height * r),
        }
    }
}

fn extraction_error(e: mupdf::Error) -> BackendError {
    BackendError::ExtractionError(e.to_string())
}

impl DocumentBackend for MupdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut text = String::new();
        let mut skipped_blocks = 0usize;
        for page in document.pages().map_err(extraction_error)? {
            let page = page.map_err(extraction_error)?;
            let band = self.band(&page.bounds().map_err(extraction_error)?);
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(extraction_error)?;

            for block in text_page.blocks() {
                if !band.keeps(&block.bounds()) {
                    skipped_blocks += 1;
                    continue;
                }
                // One visual line per output line; segmentation rejoins them.
                for line in block.lines() {
                    text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                    text.push('\n');
                }
            }
            text.push('\n');
        }

        tracing::debug!(
            path = %path.display(),
            chars = text.len(),
            skipped_blocks,
            "extracted PDF text"
        );
        Ok(text)
    }
}
