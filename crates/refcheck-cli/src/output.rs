use std::io::Write;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use refcheck_core::lookup::scholar_search_url;
use refcheck_core::{CitationStyle, ProgressEvent, Tier, TierCounts, Verdict};
use refcheck_parsing::Extraction;
use refcheck_parsing::segment::year_markers;
use refcheck_reporting::{DISCLAIMER, ReportDocument, grand_totals};

/// Whether to use colored output.
#[derive(Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(self) -> bool {
        self.0
    }
}

/// Bar shown on stderr while a document's records are checked.
pub fn progress_bar(file_name: &str, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.set_prefix(file_name.to_string());
    bar
}

/// Feed a pipeline event into the progress bar.
pub fn on_progress(bar: &ProgressBar, event: ProgressEvent) {
    match event {
        ProgressEvent::Checking { title, .. } => {
            bar.set_message(truncate(&title, 50));
        }
        ProgressEvent::Verdict { tier, .. } => {
            bar.inc(1);
            if tier == Tier::NotFound {
                bar.set_message("not found");
            }
        }
        ProgressEvent::Warning { title, message, .. } => {
            bar.println(format!("  warning: {} ({})", truncate(&title, 50), message));
        }
        ProgressEvent::QuotaExhausted { lookup } => {
            bar.println(format!(
                "  warning: {lookup} search quota exhausted; remaining searches skipped"
            ));
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

pub fn print_skipped(
    w: &mut dyn Write,
    file_name: &str,
    reason: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} ({})",
            "Skipped".yellow().bold(),
            file_name,
            reason.dimmed()
        )
    } else {
        writeln!(w, "Skipped {} ({})", file_name, reason)
    }
}

pub fn print_extraction_summary(
    w: &mut dyn Write,
    file_name: &str,
    extraction: &Extraction,
    color: ColorMode,
) -> std::io::Result<()> {
    let titled = extraction.titled().count();
    let unextractable = extraction.unextractable().count();
    if color.enabled() {
        write!(w, "{} ", file_name.bold())?;
    } else {
        write!(w, "{} ", file_name)?;
    }
    writeln!(
        w,
        "{} references ({} to check, {} without a title), section by {}",
        extraction.records.len(),
        titled,
        unextractable,
        extraction.section.detection.as_str()
    )
}

/// Print what extraction found, without any lookups.
pub fn print_dry_run(
    w: &mut dyn Write,
    file_name: &str,
    extraction: &Extraction,
    styles: &[CitationStyle],
    color: ColorMode,
) -> std::io::Result<()> {
    let section = &extraction.section;
    let heading = section.start_marker.as_deref().unwrap_or("(none)");

    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", file_name.bold())?;
        writeln!(w, "{} {}", "Section:".bold(), heading.cyan())?;
    } else {
        writeln!(w, "{}", file_name)?;
        writeln!(w, "Section: {}", heading)?;
    }
    writeln!(
        w,
        "Detected by: {} ({} lines)",
        section.detection.as_str(),
        section.lines.len()
    )?;
    writeln!(w, "References: {}", extraction.records.len())?;

    for (i, record) in extraction.records.iter().enumerate() {
        writeln!(w)?;
        let title = record.title.as_deref().unwrap_or("(no title)");
        if color.enabled() {
            writeln!(
                w,
                "[{}] {} {}",
                i + 1,
                record.style.as_str().dimmed(),
                title.bold()
            )?;
        } else {
            writeln!(w, "[{}] {} {}", i + 1, record.style.as_str(), title)?;
        }
        if let Some(doi) = &record.doi {
            writeln!(w, "    DOI: {}", doi)?;
        }
        writeln!(
            w,
            "    Year markers: {}",
            year_markers(&record.raw_text, styles).len()
        )?;
        writeln!(w, "    Raw: {}", truncate(&record.raw_text, 120))?;
    }
    Ok(())
}

/// Colored counterpart of the plain-text report, for terminals.
pub fn print_report(
    w: &mut dyn Write,
    documents: &[ReportDocument<'_>],
    report_time: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    writeln!(w)?;
    writeln!(w, "{}", "Reference Check Results".bold())?;
    writeln!(w, "{}", sep)?;
    writeln!(w, "Report time: {}", report_time)?;
    writeln!(w)?;
    writeln!(w, "{}", DISCLAIMER.dimmed())?;

    for doc in documents {
        let report = doc.report;
        writeln!(w)?;
        writeln!(w, "{}", doc.filename.bold())?;
        print_counts(w, &report.counts, report.unextractable.len(), color)?;
        if report.cancelled > 0 {
            writeln!(
                w,
                "  {} {} not checked (cancelled)",
                "!".yellow(),
                report.cancelled
            )?;
        }

        for tier in Tier::ALL {
            let entries: Vec<&Verdict> = report.by_tier(tier).collect();
            if entries.is_empty() {
                continue;
            }
            writeln!(w)?;
            let heading = format!("{} ({})", tier.label(), entries.len());
            match tier {
                Tier::NotFound => writeln!(w, "  {}", heading.red().bold())?,
                Tier::TitleSimilar | Tier::TitleRemedial => {
                    writeln!(w, "  {}", heading.yellow().bold())?
                }
                _ => writeln!(w, "  {}", heading.green().bold())?,
            }
            for (i, verdict) in entries.iter().enumerate() {
                let title = verdict.record.title.as_deref().unwrap_or_default();
                writeln!(w, "  {:>3}. {}", i + 1, title.cyan())?;
                writeln!(w, "       {}", verdict.record.raw_text.dimmed())?;
                let link = match (&verdict.url, tier) {
                    (Some(url), _) => Some(url.clone()),
                    (None, Tier::NotFound) => Some(scholar_search_url(&verdict.record.raw_text)),
                    (None, _) => None,
                };
                if let Some(link) = link {
                    writeln!(w, "       {}", link.blue().underline())?;
                }
            }
        }

        if !report.unextractable.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "  {}",
                format!(
                    "Title could not be extracted, check manually ({})",
                    report.unextractable.len()
                )
                .magenta()
                .bold()
            )?;
            for record in &report.unextractable {
                writeln!(w, "    - {}", record.raw_text)?;
            }
        }

        if report.quota_exhausted() {
            writeln!(w)?;
            writeln!(
                w,
                "  {} the Google Scholar search quota ran out. Not-found results may be incomplete.",
                "Warning:".yellow().bold()
            )?;
        } else if let Some(err) = report.search_error() {
            writeln!(w)?;
            writeln!(
                w,
                "  {} search errors degraded results ({})",
                "Warning:".yellow().bold(),
                err
            )?;
        }
    }

    if documents.len() > 1 {
        writeln!(w)?;
        writeln!(w, "{}", format!("Total ({} files)", documents.len()).bold())?;
        let unextractable = documents.iter().map(|d| d.report.unextractable.len()).sum();
        print_counts(w, &grand_totals(documents), unextractable, color)?;
    }
    Ok(())
}

fn print_counts(
    w: &mut dyn Write,
    counts: &TierCounts,
    unextractable: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "  {} checked | {} matched | {} similar | {} remedial | {} not found | {} unextractable",
            counts.total(),
            counts.matched().to_string().green(),
            counts.title_similar.to_string().yellow(),
            counts.title_remedial.to_string().yellow(),
            counts.not_found.to_string().red(),
            unextractable.to_string().magenta(),
        )
    } else {
        writeln!(
            w,
            "  {} checked | {} matched | {} similar | {} remedial | {} not found | {} unextractable",
            counts.total(),
            counts.matched(),
            counts.title_similar,
            counts.title_remedial,
            counts.not_found,
            unextractable,
        )
    }
}
