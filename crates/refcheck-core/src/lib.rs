use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod config_file;
pub mod lookup;
pub mod matching;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod rate_limit;

// Re-export for convenience
pub use backend::{BackendError, DocumentBackend};
pub use lookup::{
    IdentifierResolver, LookupError, Lookups, QuotaState, ResolvedWork, SearchHit, TitleSearch,
};
pub use normalize::{Strictness, normalize};
pub use rate_limit::RateLimiters;

/// One line of document text, numbered from 1 in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextLine {
    pub number: usize,
    pub text: String,
}

impl TextLine {
    /// Number a sequence of strings from 1.
    pub fn numbered<I, S>(texts: I) -> Vec<TextLine>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextLine {
                number: i + 1,
                text: text.into(),
            })
            .collect()
    }
}

/// Where a line sequence came from. Segmentation differs per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    /// Visual lines from a PDF page; one reference usually wraps over several.
    Pdf,
    /// Word-processor paragraphs; one paragraph is already one semantic unit.
    Paragraphs,
    /// Plain text file, treated like PDF lines.
    PlainText,
}

/// How the reference section boundary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionMethod {
    /// A short line exactly equal to a reference keyword.
    Heading,
    /// A keyword behind a numbering prefix ("5. References", "VII References", "五、參考文獻").
    ChapteredHeading,
    /// A keyword inside a noisy line, confirmed by reference-shaped lines below it.
    FuzzyHeading,
    /// No heading found; the caller chose to treat the whole document as the section.
    WholeDocument,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::ChapteredHeading => "chaptered heading",
            Self::FuzzyHeading => "fuzzy heading",
            Self::WholeDocument => "whole document",
        }
    }
}

/// The lines between a reference heading and the next stop heading.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSection {
    pub lines: Vec<TextLine>,
    /// The heading line's text as it appears in the document.
    pub start_marker: Option<String>,
    pub detection: DetectionMethod,
}

impl ReferenceSection {
    /// The section's text, lines joined by single spaces.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Citation formatting convention of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CitationStyle {
    Ieee,
    Apa,
    ApaLike,
    Unknown,
}

impl CitationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ieee => "IEEE",
            Self::Apa => "APA",
            Self::ApaLike => "APA_LIKE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical citation, isolated from the reference section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRecord {
    /// The merged source lines, whitespace-collapsed but otherwise untouched.
    pub raw_text: String,
    pub style: CitationStyle,
    pub title: Option<String>,
    pub doi: Option<String>,
}

/// Verification confidence, lowest first so that `Ord` follows confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    NotFound,
    TitleRemedial,
    TitleSimilar,
    TitleHitSecondary,
    TitleHitPrimary,
    DoiHit,
}

impl Tier {
    /// All tiers, highest confidence first.
    pub const ALL: [Tier; 6] = [
        Tier::DoiHit,
        Tier::TitleHitPrimary,
        Tier::TitleHitSecondary,
        Tier::TitleSimilar,
        Tier::TitleRemedial,
        Tier::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoiHit => "DOI_HIT",
            Self::TitleHitPrimary => "TITLE_HIT_PRIMARY",
            Self::TitleHitSecondary => "TITLE_HIT_SECONDARY",
            Self::TitleSimilar => "TITLE_SIMILAR",
            Self::TitleRemedial => "TITLE_REMEDIAL",
            Self::NotFound => "NOT_FOUND",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DoiHit => "DOI resolved (Crossref)",
            Self::TitleHitPrimary => "Title match (Scopus)",
            Self::TitleHitSecondary => "Title match (Google Scholar)",
            Self::TitleSimilar => "Similar title (Google Scholar)",
            Self::TitleRemedial => "Raw-text match (Google Scholar)",
            Self::NotFound => "Not found",
        }
    }

    /// Exact hits: DOI, primary title and secondary title.
    pub fn is_match(&self) -> bool {
        matches!(
            self,
            Self::DoiHit | Self::TitleHitPrimary | Self::TitleHitSecondary
        )
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a verdict should not be read as a clean result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Degradation {
    /// A search failed and stopped the walk. The message names the failing step.
    SearchError(String),
    /// The session's secondary-search quota ran out before or during this record.
    QuotaExceeded,
}

/// The outcome of verifying one record.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub record: ReferenceRecord,
    pub tier: Tier,
    pub url: Option<String>,
    pub degraded: Option<Degradation>,
    /// Lookups that errored while this record was checked.
    pub failed_lookups: Vec<String>,
}

/// Per-tier counters for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub doi_hit: usize,
    pub title_hit_primary: usize,
    pub title_hit_secondary: usize,
    pub title_similar: usize,
    pub title_remedial: usize,
    pub not_found: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        *self.slot(tier) += 1;
    }

    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::DoiHit => self.doi_hit,
            Tier::TitleHitPrimary => self.title_hit_primary,
            Tier::TitleHitSecondary => self.title_hit_secondary,
            Tier::TitleSimilar => self.title_similar,
            Tier::TitleRemedial => self.title_remedial,
            Tier::NotFound => self.not_found,
        }
    }

    fn slot(&mut self, tier: Tier) -> &mut usize {
        match tier {
            Tier::DoiHit => &mut self.doi_hit,
            Tier::TitleHitPrimary => &mut self.title_hit_primary,
            Tier::TitleHitSecondary => &mut self.title_hit_secondary,
            Tier::TitleSimilar => &mut self.title_similar,
            Tier::TitleRemedial => &mut self.title_remedial,
            Tier::NotFound => &mut self.not_found,
        }
    }

    pub fn total(&self) -> usize {
        Tier::ALL.iter().map(|t| self.get(*t)).sum()
    }

    /// DOI, primary and secondary exact hits.
    pub fn matched(&self) -> usize {
        self.doi_hit + self.title_hit_primary + self.title_hit_secondary
    }

    pub fn merge(&mut self, other: &TierCounts) {
        for tier in Tier::ALL {
            *self.slot(tier) += other.get(tier);
        }
    }
}

/// Everything the pipeline produced for one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    /// One verdict per record with a title, in section order.
    pub entries: Vec<Verdict>,
    /// Records whose title could not be extracted; never looked up.
    pub unextractable: Vec<ReferenceRecord>,
    pub counts: TierCounts,
    /// Records left unchecked because the run was cancelled.
    pub cancelled: usize,
}

impl DocumentReport {
    pub fn new(
        entries: Vec<Verdict>,
        unextractable: Vec<ReferenceRecord>,
        cancelled: usize,
    ) -> Self {
        let mut counts = TierCounts::default();
        for verdict in &entries {
            counts.add(verdict.tier);
        }
        Self {
            entries,
            unextractable,
            counts,
            cancelled,
        }
    }

    /// Verdicts of a single tier, in section order.
    pub fn by_tier(&self, tier: Tier) -> impl Iterator<Item = &Verdict> {
        self.entries.iter().filter(move |v| v.tier == tier)
    }

    pub fn quota_exhausted(&self) -> bool {
        self.entries
            .iter()
            .any(|v| v.degraded == Some(Degradation::QuotaExceeded))
    }

    /// First secondary-search error message, if any record hit one.
    pub fn search_error(&self) -> Option<&str> {
        self.entries.iter().find_map(|v| match &v.degraded {
            Some(Degradation::SearchError(msg)) => Some(msg.as_str()),
            _ => None,
        })
    }
}

/// Progress events emitted while records are checked.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Checking {
        index: usize,
        total: usize,
        title: String,
    },
    Verdict {
        index: usize,
        total: usize,
        tier: Tier,
    },
    Warning {
        index: usize,
        title: String,
        message: String,
    },
    /// The secondary search reported its quota as spent. Sent once per session.
    QuotaExhausted { lookup: String },
}

/// Configuration for the lookup side of the pipeline.
#[derive(Clone)]
pub struct Config {
    pub scopus_api_key: Option<String>,
    pub serpapi_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub num_workers: usize,
    /// Per external call.
    pub timeout_secs: u64,
    /// Minimum similarity ratio (0..1) for a TITLE_SIMILAR verdict.
    pub similarity_threshold: f64,
    /// Number of candidates requested from the secondary search.
    pub secondary_limit: usize,
    /// Lookup names to leave out ("Crossref", "Scopus", "Google Scholar").
    pub disabled_lookups: Vec<String>,
    pub rate_limiters: Arc<RateLimiters>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("scopus_api_key", &self.scopus_api_key.as_ref().map(|_| "***"))
            .field("serpapi_key", &self.serpapi_key.as_ref().map(|_| "***"))
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("num_workers", &self.num_workers)
            .field("timeout_secs", &self.timeout_secs)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("secondary_limit", &self.secondary_limit)
            .field("disabled_lookups", &self.disabled_lookups)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scopus_api_key: None,
            serpapi_key: None,
            crossref_mailto: None,
            num_workers: 4,
            timeout_secs: 10,
            similarity_threshold: matching::DEFAULT_SIMILARITY_THRESHOLD,
            secondary_limit: 3,
            disabled_lookups: vec![],
            rate_limiters: Arc::new(RateLimiters::default()),
        }
    }
}

impl Config {
    pub fn is_disabled(&self, lookup_name: &str) -> bool {
        self.disabled_lookups
            .iter()
            .any(|d| d.eq_ignore_ascii_case(lookup_name))
    }
}

/// Verify a document's records.
///
/// Records without a title are set aside as unextractable; the rest run
/// through the match pipeline on a bounded worker pool. Progress events are
/// emitted via the callback. Cancellation stops new records from starting;
/// verdicts already computed are kept.
pub async fn check_records(
    records: Vec<ReferenceRecord>,
    lookups: Arc<Lookups>,
    config: Arc<Config>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> DocumentReport {
    let (titled, unextractable): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.title.is_some());

    let total = titled.len();
    let verdicts = pool::check_records(titled, lookups, config, progress, cancel).await;
    let cancelled = total - verdicts.len();
    if cancelled > 0 {
        tracing::info!(cancelled, "run cancelled, keeping partial results");
    }

    DocumentReport::new(verdicts, unextractable, cancelled)
}
