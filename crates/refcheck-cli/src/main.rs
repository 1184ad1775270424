use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use refcheck_core::config_file::{self, ConfigFile};
use refcheck_core::{Config, DocumentReport, Lookups, RateLimiters};
use refcheck_parsing::{ParsingConfigBuilder, ReferenceExtractor};
use refcheck_reporting::{ExportFormat, ReportDocument};

mod output;

use output::ColorMode;

/// Reference checker - locate the bibliography of a paper or thesis and
/// verify each entry against Crossref, Scopus and Google Scholar
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the references of one or more .pdf, .docx or .txt files
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Documents to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Dry run: extract and print references without any lookups
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format: text, csv or json
    #[arg(long, default_value = "text")]
    format: ExportFormat,

    /// Number of records checked concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Fail when no reference heading is found instead of using the whole document
    #[arg(long)]
    no_fallback: bool,

    /// Scopus API key
    #[arg(long)]
    scopus_key: Option<String>,

    /// SerpAPI key (Google Scholar)
    #[arg(long)]
    serpapi_key: Option<String>,

    /// Contact address sent to Crossref (raises its rate limit)
    #[arg(long)]
    crossref_mailto: Option<String>,

    /// Comma-separated list of lookups to disable (Crossref, Scopus, "Google Scholar")
    #[arg(long, value_delimiter = ',')]
    disable_lookups: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::Check(args) => {
            if args.dry_run {
                dry_run_check(&args)
            } else {
                check(&args).await
            }
        }
    }
}

/// Install the fmt subscriber. The returned guard flushes the log file on drop.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_directive = match verbose {
        0 => "refcheck=warn",
        1 => "refcheck=info",
        _ => "refcheck=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            builder.with_writer(writer).with_ansi(false).init();
            Ok(Some(guard))
        }
        None => {
            builder.with_writer(std::io::stderr).init();
            Ok(None)
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the lookup configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(args: &CheckArgs, file_config: &ConfigFile) -> Config {
    let mut config = Config::default();
    file_config.apply_to(&mut config);

    if let Some(key) = env_var("SCOPUS_API_KEY") {
        config.scopus_api_key = Some(key);
    }
    if let Some(key) = env_var("SERPAPI_KEY") {
        config.serpapi_key = Some(key);
    }
    if let Some(mailto) = env_var("CROSSREF_MAILTO") {
        config.crossref_mailto = Some(mailto);
    }
    if let Some(timeout) = env_var("REFCHECK_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.timeout_secs = timeout;
    }

    if let Some(key) = &args.scopus_key {
        config.scopus_api_key = Some(key.clone());
    }
    if let Some(key) = &args.serpapi_key {
        config.serpapi_key = Some(key.clone());
    }
    if let Some(mailto) = &args.crossref_mailto {
        config.crossref_mailto = Some(mailto.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(workers) = args.workers {
        config.num_workers = workers.max(1);
    }
    if !args.disable_lookups.is_empty() {
        config.disabled_lookups = args
            .disable_lookups
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    config.rate_limiters = Arc::new(RateLimiters::new(config.crossref_mailto.is_some()));
    config
}

fn build_extractor(
    args: &CheckArgs,
    file_config: &ConfigFile,
) -> anyhow::Result<ReferenceExtractor> {
    let section = file_config.parsing.clone().unwrap_or_default();
    let mut builder = ParsingConfigBuilder::from_file_section(&section);
    if args.no_fallback {
        builder = builder.whole_document_fallback(false);
    }
    let parsing_config = builder.build().context("invalid [parsing] configuration")?;
    Ok(ReferenceExtractor::with_config(parsing_config))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn dry_run_check(args: &CheckArgs) -> anyhow::Result<()> {
    let file_config = config_file::load_config();
    let extractor = build_extractor(args, &file_config)?;
    let color = ColorMode(!args.no_color);
    let stdout = std::io::stdout();
    let mut w = stdout.lock();

    for path in &args.files {
        let name = display_name(path);
        if !refcheck_ingest::is_supported(path) {
            output::print_skipped(&mut w, &name, "unsupported file type", color)?;
            continue;
        }
        match refcheck_ingest::extract_references(path, &extractor) {
            Ok(extraction) => output::print_dry_run(
                &mut w,
                &name,
                &extraction,
                extractor.config().styles(),
                color,
            )?,
            Err(e) => output::print_skipped(&mut w, &name, &e.to_string(), color)?,
        }
    }
    Ok(())
}

async fn check(args: &CheckArgs) -> anyhow::Result<()> {
    let file_config = config_file::load_config();
    let extractor = build_extractor(args, &file_config)?;
    let config = Arc::new(resolve_config(args, &file_config));
    tracing::debug!(?config, "resolved configuration");

    // One session for every file: rate limits and the quota flag carry over.
    let lookups = Arc::new(Lookups::from_config(&config));
    let lookup_names = lookups.names();
    if lookup_names.is_empty() {
        anyhow::bail!("every lookup is disabled or missing its API key; nothing to check against");
    }

    let use_color = !args.no_color && args.output.is_none();
    let color = ColorMode(use_color);
    let mut w: Box<dyn Write> = Box::new(std::io::stdout());
    writeln!(w, "Checking against: {}", lookup_names.join(", "))?;

    // Set up Ctrl+C handler
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let mut results: Vec<(String, DocumentReport)> = Vec::new();
    for path in &args.files {
        if cancel.is_cancelled() {
            break;
        }
        let name = display_name(path);
        if !refcheck_ingest::is_supported(path) {
            output::print_skipped(&mut w, &name, "unsupported file type", color)?;
            continue;
        }
        let extraction = match refcheck_ingest::extract_references(path, &extractor) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "extraction failed");
                output::print_skipped(&mut w, &name, &e.to_string(), color)?;
                continue;
            }
        };
        output::print_extraction_summary(&mut w, &name, &extraction, color)?;

        let bar = output::progress_bar(&name, extraction.titled().count() as u64);
        let progress = {
            let bar = bar.clone();
            move |event| output::on_progress(&bar, event)
        };
        let report = refcheck_core::check_records(
            extraction.records,
            Arc::clone(&lookups),
            Arc::clone(&config),
            progress,
            cancel.clone(),
        )
        .await;
        bar.finish_and_clear();
        results.push((name, report));
    }

    let documents: Vec<ReportDocument<'_>> = results
        .iter()
        .map(|(filename, report)| ReportDocument { filename, report })
        .collect();

    match &args.output {
        Some(path) => {
            refcheck_reporting::export_results(&documents, args.format, path)
                .map_err(anyhow::Error::msg)?;
            writeln!(w, "Report written to {}", path.display())?;
        }
        None if args.format == ExportFormat::Text && color.enabled() => {
            let generated_at = refcheck_reporting::report_time();
            output::print_report(&mut w, &documents, &generated_at, color)?;
        }
        None => {
            let rendered = refcheck_reporting::render(
                &documents,
                args.format,
                &refcheck_reporting::report_time(),
            )
            .map_err(anyhow::Error::msg)?;
            w.write_all(rendered.as_bytes())?;
        }
    }

    if cancel.is_cancelled() {
        writeln!(w, "Interrupted: partial results shown.")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CheckArgs {
        let mut argv = vec!["refcheck", "check", "paper.pdf"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Check(args) => args,
        }
    }

    #[test]
    fn flags_parse() {
        let args = args(&[
            "--format",
            "csv",
            "--disable-lookups",
            "Scopus,Google Scholar",
            "--workers",
            "2",
        ]);
        assert_eq!(args.format, ExportFormat::Csv);
        assert_eq!(args.disable_lookups, vec!["Scopus", "Google Scholar"]);
        assert_eq!(args.workers, Some(2));
    }

    #[test]
    fn flags_override_config_file() {
        let file: ConfigFile = toml::from_str(
            "[api_keys]\nscopus_api_key = \"from-file\"\n[concurrency]\nnum_workers = 8\n",
        )
        .unwrap();
        let config = resolve_config(&args(&["--scopus-key", "from-flag"]), &file);
        assert_eq!(config.scopus_api_key.as_deref(), Some("from-flag"));
        assert_eq!(config.num_workers, 8);

        let config = resolve_config(&args(&["--workers", "0"]), &file);
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn no_fallback_is_applied() {
        let extractor =
            build_extractor(&args(&["--no-fallback"]), &ConfigFile::default()).unwrap();
        assert!(!extractor.config().whole_document_fallback());
        let extractor = build_extractor(&args(&[]), &ConfigFile::default()).unwrap();
        assert!(extractor.config().whole_document_fallback());
    }
}
