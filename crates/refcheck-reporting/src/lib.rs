pub mod export;
pub mod types;

pub use export::{DISCLAIMER, export_results, render, report_time};
pub use types::{ExportFormat, ReportDocument, grand_totals};
