use std::fmt;
use std::str::FromStr;

use refcheck_core::{DocumentReport, TierCounts};

/// Output formats for [`export_results`](crate::export_results).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Text, ExportFormat::Csv, ExportFormat::Json]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!(
                "unknown format '{other}' (expected one of: text, csv, json)"
            )),
        }
    }
}

/// One checked document as the report sees it.
#[derive(Debug, Clone, Copy)]
pub struct ReportDocument<'a> {
    pub filename: &'a str,
    pub report: &'a DocumentReport,
}

/// Tier counters summed over every document.
pub fn grand_totals(documents: &[ReportDocument<'_>]) -> TierCounts {
    let mut totals = TierCounts::default();
    for doc in documents {
        totals.merge(&doc.report.counts);
    }
    totals
}
