use refcheck_core::CitationStyle;
use refcheck_core::config_file::ParsingSection;

use crate::ParsingError;

/// Headings that open a reference list, lowercased.
pub const DEFAULT_HEADING_KEYWORDS: &[&str] = &[
    "references",
    "reference",
    "bibliography",
    "works cited",
    "literature cited",
    "參考文獻",
    "参考文献",
    "參考資料",
    "引用文獻",
];

/// Headings that close a reference list, lowercased.
pub const DEFAULT_STOP_KEYWORDS: &[&str] = &["appendix", "appendices", "附錄", "附录"];

/// Styles in classification precedence order.
pub const DEFAULT_STYLES: &[CitationStyle] =
    &[CitationStyle::Ieee, CitationStyle::Apa, CitationStyle::ApaLike];

/// Controls how a list of values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }

    fn push(&mut self, value: T) {
        match self {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(value),
            ListOverride::Default => *self = ListOverride::Extend(vec![value]),
        }
    }
}

/// Configuration for section location, segmentation and record extraction.
///
/// Use [`ParsingConfigBuilder`] to construct a non-default config.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── section.rs ──
    /// Lowercased keywords, resolved against the defaults.
    pub(crate) heading_keywords: Vec<String>,
    pub(crate) stop_keywords: Vec<String>,
    /// Longest line (in characters, numbering prefix excluded) that can be a heading.
    pub(crate) heading_max_chars: usize,
    /// Lines below a fuzzy heading inspected for reference shape.
    pub(crate) shape_lookahead: usize,
    /// Use the whole document when no heading is found.
    pub(crate) whole_document_fallback: bool,

    // ── segment.rs ──
    /// How far (in characters) before a year marker a multi-citation line is cut.
    pub(crate) split_backoff_chars: usize,
    /// Split PDF text at `[n]` boundaries when the list starts with `[1]`.
    pub(crate) ieee_fast_path: bool,

    // ── style.rs ──
    pub(crate) styles: Vec<CitationStyle>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            heading_keywords: to_owned(DEFAULT_HEADING_KEYWORDS),
            stop_keywords: to_owned(DEFAULT_STOP_KEYWORDS),
            heading_max_chars: 30,
            shape_lookahead: 5,
            whole_document_fallback: true,
            split_backoff_chars: 5,
            ieee_fast_path: true,
            styles: DEFAULT_STYLES.to_vec(),
        }
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl ParsingConfig {
    pub fn heading_keywords(&self) -> &[String] {
        &self.heading_keywords
    }

    pub fn split_backoff_chars(&self) -> usize {
        self.split_backoff_chars
    }

    pub fn whole_document_fallback(&self) -> bool {
        self.whole_document_fallback
    }

    /// Enabled styles in precedence order.
    pub fn styles(&self) -> &[CitationStyle] {
        &self.styles
    }
}

/// Builder for [`ParsingConfig`].
///
/// [`build()`](Self::build) validates the values and fails fast on an
/// unusable combination.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    heading_keywords: ListOverride<String>,
    stop_keywords: ListOverride<String>,
    heading_max_chars: Option<usize>,
    shape_lookahead: Option<usize>,
    whole_document_fallback: Option<bool>,
    split_backoff_chars: Option<usize>,
    ieee_fast_path: Option<bool>,
    styles: Option<Vec<CitationStyle>>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the `[parsing]` table of a config file.
    pub fn from_file_section(section: &ParsingSection) -> Self {
        let mut builder = Self::new();
        for kw in section.extra_heading_keywords.iter().flatten() {
            builder = builder.add_heading_keyword(kw);
        }
        for kw in section.extra_stop_keywords.iter().flatten() {
            builder = builder.add_stop_keyword(kw);
        }
        builder.heading_max_chars = section.heading_max_chars;
        builder.split_backoff_chars = section.split_backoff_chars;
        builder.whole_document_fallback = section.whole_document_fallback;
        builder.ieee_fast_path = section.ieee_fast_path;
        builder
    }

    // ── Keywords ──

    pub fn set_heading_keywords(mut self, keywords: Vec<String>) -> Self {
        self.heading_keywords = ListOverride::Replace(keywords);
        self
    }

    pub fn add_heading_keyword(mut self, keyword: &str) -> Self {
        self.heading_keywords.push(keyword.to_string());
        self
    }

    pub fn set_stop_keywords(mut self, keywords: Vec<String>) -> Self {
        self.stop_keywords = ListOverride::Replace(keywords);
        self
    }

    pub fn add_stop_keyword(mut self, keyword: &str) -> Self {
        self.stop_keywords.push(keyword.to_string());
        self
    }

    // ── Scalars ──

    pub fn heading_max_chars(mut self, n: usize) -> Self {
        self.heading_max_chars = Some(n);
        self
    }

    pub fn shape_lookahead(mut self, n: usize) -> Self {
        self.shape_lookahead = Some(n);
        self
    }

    pub fn whole_document_fallback(mut self, enabled: bool) -> Self {
        self.whole_document_fallback = Some(enabled);
        self
    }

    pub fn split_backoff_chars(mut self, n: usize) -> Self {
        self.split_backoff_chars = Some(n);
        self
    }

    pub fn ieee_fast_path(mut self, enabled: bool) -> Self {
        self.ieee_fast_path = Some(enabled);
        self
    }

    /// Restrict classification to these styles. Precedence order is kept.
    pub fn styles(mut self, styles: Vec<CitationStyle>) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn build(self) -> Result<ParsingConfig, ParsingError> {
        let defaults = ParsingConfig::default();

        let clean = |keywords: Vec<String>| -> Vec<String> {
            let mut out: Vec<String> = Vec::new();
            for kw in keywords {
                let kw = refcheck_core::normalize::collapse_whitespace(&kw).to_lowercase();
                if !kw.is_empty() && !out.contains(&kw) {
                    out.push(kw);
                }
            }
            out
        };

        let heading_keywords = clean(self.heading_keywords.resolve(&defaults.heading_keywords));
        if heading_keywords.is_empty() {
            return Err(ParsingError::InvalidConfig(
                "at least one heading keyword is required".into(),
            ));
        }
        let stop_keywords = clean(self.stop_keywords.resolve(&defaults.stop_keywords));

        let heading_max_chars = self.heading_max_chars.unwrap_or(defaults.heading_max_chars);
        if heading_max_chars == 0 {
            return Err(ParsingError::InvalidConfig(
                "heading_max_chars must be positive".into(),
            ));
        }

        let styles = match self.styles {
            Some(requested) => {
                if requested.is_empty() {
                    return Err(ParsingError::InvalidConfig(
                        "at least one citation style is required".into(),
                    ));
                }
                if requested.contains(&CitationStyle::Unknown) {
                    return Err(ParsingError::InvalidConfig(
                        "UNKNOWN is not a selectable style".into(),
                    ));
                }
                // Keep precedence regardless of the order given.
                DEFAULT_STYLES
                    .iter()
                    .copied()
                    .filter(|s| requested.contains(s))
                    .collect()
            }
            None => defaults.styles,
        };

        Ok(ParsingConfig {
            heading_keywords,
            stop_keywords,
            heading_max_chars,
            shape_lookahead: self.shape_lookahead.unwrap_or(defaults.shape_lookahead),
            whole_document_fallback: self
                .whole_document_fallback
                .unwrap_or(defaults.whole_document_fallback),
            split_backoff_chars: self
                .split_backoff_chars
                .unwrap_or(defaults.split_backoff_chars),
            ieee_fast_path: self.ieee_fast_path.unwrap_or(defaults.ieee_fast_path),
            styles,
        })
    }
}
