//! Paragraph text from Word `.docx` files.
//!
//! A docx is a zip container; the body lives in `word/document.xml`:
//! ```xml
//! <w:body>
//!   <w:p><w:r><w:t>Huang, C. (2021). </w:t></w:r><w:r><w:t>A study.</w:t></w:r></w:p>
//! </w:body>
//! ```
//! Each `<w:p>` becomes one paragraph; its `<w:t>` runs are concatenated.

use std::fs::File;
use std::io::{BufRead, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Error, Debug)]
pub enum DocxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid docx container: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Read the non-empty, trimmed paragraphs of a docx file in document order.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, DocxError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut xml = Vec::new();
    archive.by_name(DOCUMENT_PART)?.read_to_end(&mut xml)?;
    parse_paragraphs(xml.as_slice())
}

/// Parse `document.xml` content into paragraphs.
pub fn parse_paragraphs<R: BufRead>(reader: R) -> Result<Vec<String>, DocxError> {
    let mut xml_reader = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    // One buffer per open paragraph; text boxes nest paragraphs inside paragraphs.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                // Tabs and soft line breaks separate words.
                b"tab" | b"br" => {
                    if let Some(current) = open.last_mut() {
                        current.push(' ');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(current) = open.last_mut() {
                    current.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(current) = open.pop() {
                        let paragraph = current.trim();
                        if !paragraph.is_empty() {
                            paragraphs.push(paragraph.to_string());
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_are_joined_and_empty_paragraphs_dropped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>References</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t xml:space="preserve">Huang, C. (2021). </w:t></w:r><w:r><w:t>A study &amp; more.</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">   </w:t></w:r></w:p>
    <w:p><w:r><w:t>Lee,</w:t><w:tab/><w:t>K.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let paragraphs = parse_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(
            paragraphs,
            vec!["References", "Huang, C. (2021). A study & more.", "Lee, K."]
        );
    }

    #[test]
    fn text_box_paragraph_keeps_outer_text() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
<w:p><w:r><w:t xml:space="preserve">Huang, C. (2021). </w:t></w:r><w:r><w:txbxContent><w:p><w:r><w:t>Box note</w:t></w:r></w:p></w:txbxContent></w:r><w:r><w:t>A study of citation networks.</w:t></w:r></w:p>
</w:body></w:document>"#;
        let paragraphs = parse_paragraphs(xml.as_bytes()).unwrap();
        assert_eq!(
            paragraphs,
            vec![
                "Box note",
                "Huang, C. (2021). A study of citation networks."
            ]
        );
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        let result = parse_paragraphs("<w:p><w:t>open</w:x></w:p>".as_bytes());
        assert!(matches!(result, Err(DocxError::Xml(_))));
    }
}
