use std::io::Write;
use std::path::Path;

use refcheck_core::{CitationStyle, SourceKind};
use refcheck_ingest::{IngestError, extract_references, load_document};
use refcheck_parsing::ReferenceExtractor;

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[test]
fn docx_paragraphs_become_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thesis.docx");
    write_docx(
        &path,
        &[
            "Chapter five text.",
            "參考文獻",
            "王小明（2019）。教育研究方法。台北：五南。",
            "Huang, C. (2021). A study of citation networks. Journal X, 5(2), 10-20.",
            "",
        ],
    );

    let document = load_document(&path).unwrap();
    assert_eq!(document.source, SourceKind::Paragraphs);
    assert_eq!(document.lines.len(), 4);

    let extraction = extract_references(&path, &ReferenceExtractor::new()).unwrap();
    assert_eq!(extraction.records.len(), 2);
    assert_eq!(extraction.records[0].title.as_deref(), Some("教育研究方法"));
    assert_eq!(
        extraction.records[1].title.as_deref(),
        Some("A study of citation networks")
    );
    assert!(
        extraction
            .records
            .iter()
            .all(|r| r.style == CitationStyle::Apa)
    );
}

#[test]
fn text_file_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paper.txt");
    std::fs::write(
        &path,
        "Intro\n\nReferences\n[1] Lin, J. \"Deep Learning Methods,\" IEEE Trans. 2019.\n[2] B. Author, \"Second paper,\"\n   in Proc. X, 2020.\n",
    )
    .unwrap();

    let document = load_document(&path).unwrap();
    assert_eq!(document.source, SourceKind::PlainText);
    assert_eq!(document.lines.len(), 5);

    let extraction = extract_references(&path, &ReferenceExtractor::new()).unwrap();
    let titles: Vec<_> = extraction.titled().filter_map(|r| r.title.as_deref()).collect();
    assert_eq!(titles, vec!["Deep Learning Methods", "Second paper"]);
}

#[test]
fn corrupt_docx_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.docx");
    std::fs::write(&path, b"not a zip").unwrap();

    assert!(matches!(load_document(&path), Err(IngestError::Docx(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_document(Path::new("/nonexistent/refcheck/paper.txt"));
    assert!(matches!(result, Err(IngestError::Io(_))));
}
