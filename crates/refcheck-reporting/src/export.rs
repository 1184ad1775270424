use std::io::Write;
use std::path::Path;

use serde::Serialize;

use refcheck_core::lookup::scholar_search_url;
use refcheck_core::{Degradation, ReferenceRecord, Tier, TierCounts, Verdict};

use crate::types::{ExportFormat, ReportDocument, grand_totals};

/// Printed at the head of every report.
pub const DISCLAIMER: &str = "Only reference titles (and DOIs, where present) are checked. \
Journal names, authors, volumes, issues and pages are not verified.\n\
This report is a preliminary screen for manual review. It must not be used as \
the basis for any academic-integrity judgement.";

/// Local time in report format.
pub fn report_time() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Export results for a set of documents to the given path.
///
/// CSV output starts with a UTF-8 byte order mark so spreadsheet programs
/// detect the encoding of non-ASCII references.
pub fn export_results(
    documents: &[ReportDocument<'_>],
    format: ExportFormat,
    path: &Path,
) -> Result<(), String> {
    let content = render(documents, format, &report_time())?;

    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    if format == ExportFormat::Csv {
        file.write_all("\u{feff}".as_bytes())
            .map_err(|e| format!("Failed to write: {}", e))?;
    }
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    Ok(())
}

/// Render a report. `generated_at` is printed as the report time.
pub fn render(
    documents: &[ReportDocument<'_>],
    format: ExportFormat,
    generated_at: &str,
) -> Result<String, String> {
    match format {
        ExportFormat::Text => Ok(export_text(documents, generated_at)),
        ExportFormat::Csv => Ok(export_csv(documents, generated_at)),
        ExportFormat::Json => export_json(documents, generated_at)
            .map_err(|e| format!("Failed to serialize report: {}", e)),
    }
}

/// Where a reader can follow up on a verdict: the hit's URL, or a Scholar
/// search for the raw reference when nothing was found.
fn link(verdict: &Verdict) -> Option<String> {
    match (&verdict.url, verdict.tier) {
        (Some(url), _) => Some(url.clone()),
        (None, Tier::NotFound) => Some(scholar_search_url(&verdict.record.raw_text)),
        (None, _) => None,
    }
}

fn degradation_note(verdict: &Verdict) -> Option<String> {
    match &verdict.degraded {
        Some(Degradation::QuotaExceeded) => {
            Some("search quota exhausted, result not conclusive".to_string())
        }
        Some(Degradation::SearchError(msg)) => Some(msg.clone()),
        None => None,
    }
}

fn summary_line(counts: &TierCounts, unextractable: usize) -> String {
    format!(
        "{} checked | {} matched | {} similar | {} remedial | {} not found | {} unextractable",
        counts.total(),
        counts.matched(),
        counts.title_similar,
        counts.title_remedial,
        counts.not_found,
        unextractable,
    )
}

// ── Text ──

fn export_text(documents: &[ReportDocument<'_>], generated_at: &str) -> String {
    let mut out = String::from("Reference Check Results\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');
    out.push_str(&format!("Report time: {generated_at}\n\n{DISCLAIMER}\n"));

    for doc in documents {
        let report = doc.report;
        out.push_str(&format!(
            "\n{}\n{}\n",
            doc.filename,
            "-".repeat(doc.filename.chars().count())
        ));
        out.push_str("  ");
        out.push_str(&summary_line(&report.counts, report.unextractable.len()));
        if report.cancelled > 0 {
            out.push_str(&format!(" | {} cancelled", report.cancelled));
        }
        out.push('\n');

        for tier in Tier::ALL {
            let entries: Vec<&Verdict> = report.by_tier(tier).collect();
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("\n  {} ({})\n", tier.label(), entries.len()));
            for (i, verdict) in entries.iter().enumerate() {
                let title = verdict.record.title.as_deref().unwrap_or_default();
                out.push_str(&format!("  {:>3}. {}\n", i + 1, title));
                out.push_str(&format!("       {}\n", verdict.record.raw_text));
                if let Some(url) = link(verdict) {
                    out.push_str(&format!("       Link: {url}\n"));
                }
                if let Some(note) = degradation_note(verdict) {
                    out.push_str(&format!("       Note: {note}\n"));
                }
            }
        }

        if !report.unextractable.is_empty() {
            out.push_str(&format!(
                "\n  Title could not be extracted, check manually ({})\n",
                report.unextractable.len()
            ));
            for record in &report.unextractable {
                out.push_str(&format!("    - {}\n", record.raw_text));
            }
        }

        if report.quota_exhausted() {
            out.push_str(
                "\n  Warning: the Google Scholar search quota ran out. Not-found results may be incomplete.\n",
            );
        } else if let Some(err) = report.search_error() {
            out.push_str(&format!(
                "\n  Warning: search errors degraded results ({err}).\n"
            ));
        }
    }

    if documents.len() > 1 {
        let unextractable: usize = documents.iter().map(|d| d.report.unextractable.len()).sum();
        out.push_str(&format!(
            "\nTotal ({} files): {}\n",
            documents.len(),
            summary_line(&grand_totals(documents), unextractable)
        ));
    }
    out
}

// ── CSV ──

fn csv_escape(s: &str) -> String {
    if s.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(documents: &[ReportDocument<'_>], generated_at: &str) -> String {
    let mut out = format!("Report time: {generated_at}\n\n");
    for line in DISCLAIMER.lines() {
        out.push_str(&csv_escape(line));
        out.push('\n');
    }
    out.push('\n');
    out.push_str("File,Reference,Result,Link\n");

    for doc in documents {
        for verdict in &doc.report.entries {
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_escape(doc.filename),
                csv_escape(&verdict.record.raw_text),
                csv_escape(verdict.tier.label()),
                csv_escape(&link(verdict).unwrap_or_default()),
            ));
        }
        for record in &doc.report.unextractable {
            out.push_str(&format!(
                "{},{},Title not extracted,\n",
                csv_escape(doc.filename),
                csv_escape(&record.raw_text),
            ));
        }
    }
    out
}

// ── JSON ──

#[derive(Serialize)]
struct JsonReport<'a> {
    report_time: &'a str,
    disclaimer: &'a str,
    totals: TierCounts,
    documents: Vec<JsonDocument<'a>>,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    filename: &'a str,
    counts: &'a TierCounts,
    matched: usize,
    cancelled: usize,
    quota_exhausted: bool,
    entries: Vec<JsonEntry<'a>>,
    unextractable: &'a [ReferenceRecord],
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    #[serde(flatten)]
    verdict: &'a Verdict,
    label: &'static str,
    link: Option<String>,
}

fn export_json(
    documents: &[ReportDocument<'_>],
    generated_at: &str,
) -> serde_json::Result<String> {
    let report = JsonReport {
        report_time: generated_at,
        disclaimer: DISCLAIMER,
        totals: grand_totals(documents),
        documents: documents
            .iter()
            .map(|doc| JsonDocument {
                filename: doc.filename,
                counts: &doc.report.counts,
                matched: doc.report.counts.matched(),
                cancelled: doc.report.cancelled,
                quota_exhausted: doc.report.quota_exhausted(),
                entries: doc
                    .report
                    .entries
                    .iter()
                    .map(|verdict| JsonEntry {
                        verdict,
                        label: verdict.tier.label(),
                        link: link(verdict),
                    })
                    .collect(),
                unextractable: &doc.report.unextractable,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&report)
}
