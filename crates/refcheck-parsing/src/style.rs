//! Citation style rules.
//!
//! One rule object per [`CitationStyle`] variant. Each answers three
//! questions about a piece of reference text: does it start a new reference,
//! where are its year (or number) anchors, and what is its title. Rules
//! accept raw or light-normalized text; ASCII and full-width punctuation
//! are both recognized so offsets into raw text stay usable.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use refcheck_core::CitationStyle;

use crate::config::DEFAULT_STYLES;

/// Characters before a year marker that must be digit-free.
const PRECEDING_WINDOW: usize = 5;

pub trait StyleRules: Send + Sync {
    fn style(&self) -> CitationStyle;

    /// Does this line or fragment look like the start of a reference?
    fn is_head(&self, text: &str) -> bool;

    /// Byte spans of every valid anchor, in text order, false positives removed.
    fn find_year_markers(&self, text: &str) -> Vec<Range<usize>>;

    fn extract_title(&self, text: &str) -> Option<String>;

    /// Whole-record classification.
    fn detects(&self, text: &str) -> bool;
}

pub struct IeeeRules;
pub struct ApaRules;
pub struct ApaLikeRules;

static IEEE: IeeeRules = IeeeRules;
static APA: ApaRules = ApaRules;
static APA_LIKE: ApaLikeRules = ApaLikeRules;

/// The rule object for a style. `None` for [`CitationStyle::Unknown`].
pub fn rules_for(style: CitationStyle) -> Option<&'static dyn StyleRules> {
    match style {
        CitationStyle::Ieee => Some(&IEEE),
        CitationStyle::Apa => Some(&APA),
        CitationStyle::ApaLike => Some(&APA_LIKE),
        CitationStyle::Unknown => None,
    }
}

/// Classify a record: first enabled style in IEEE > APA > APA_LIKE order that
/// detects the text, else UNKNOWN.
pub fn detect_style(text: &str, enabled: &[CitationStyle]) -> CitationStyle {
    DEFAULT_STYLES
        .iter()
        .copied()
        .filter(|s| enabled.contains(s))
        .find(|s| rules_for(*s).is_some_and(|r| r.detects(text)))
        .unwrap_or(CitationStyle::Unknown)
}

/// True if any of the `n` characters before byte offset `pos` is a digit.
fn digit_before(text: &str, pos: usize, n: usize) -> bool {
    text[..pos].chars().rev().take(n).any(char::is_numeric)
}

/// Title span starting at `start`: up to the first terminal punctuation that
/// is not next to a digit. `?` and `!` are kept as part of the title.
fn title_after(text: &str, start: usize) -> Option<String> {
    let rest = text[start..].trim_start();
    let chars: Vec<(usize, char)> = rest.char_indices().collect();
    let mut end = rest.len();

    for (i, &(pos, c)) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j].1);
        let next = chars.get(i + 1).map(|&(_, n)| n);
        let digit_adjacent =
            prev.is_some_and(char::is_numeric) || next.is_some_and(char::is_numeric);
        let boundary = next.is_none_or(char::is_whitespace);

        match c {
            '.' | '．' if boundary && !digit_adjacent => {
                end = pos;
                break;
            }
            '。' if !digit_adjacent => {
                end = pos;
                break;
            }
            '?' | '!' | '？' | '！' if boundary => {
                end = pos + c.len_utf8();
                break;
            }
            _ => {}
        }
    }

    let title = rest[..end]
        .trim()
        .trim_end_matches([',', ';', ':', '，', '；', '：'])
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}

// ── IEEE ──

static IEEE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[\d+\]").unwrap());
static IEEE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|“([^”]+)”"#).unwrap());

impl IeeeRules {
    /// First comma/period-bounded run that reads like a title. It must start
    /// upper case, end in a letter and have two or more words with no stray
    /// initials. Runs containing "et al" are author lists.
    fn fallback_title(text: &str) -> Option<String> {
        let body = match IEEE_HEAD.find(text) {
            Some(m) => &text[m.end()..],
            None => text,
        };

        let mut segment_start = 0;
        for (pos, c) in body.char_indices().chain(std::iter::once((body.len(), '.'))) {
            if c != ',' && c != '.' {
                continue;
            }
            let segment = body[segment_start..pos].trim();
            segment_start = pos + c.len_utf8();

            if segment.to_lowercase().contains("et al") {
                continue;
            }
            if Self::looks_like_title(segment) {
                return Some(segment.to_string());
            }
        }
        None
    }

    fn looks_like_title(segment: &str) -> bool {
        let starts_upper = segment.chars().next().is_some_and(char::is_uppercase);
        let ends_letter = segment.chars().last().is_some_and(char::is_alphabetic);
        let words: Vec<&str> = segment.split_whitespace().collect();
        let stray_initial = words
            .iter()
            .skip(1)
            .any(|w| w.chars().count() == 1 && w.chars().all(char::is_uppercase));
        starts_upper && ends_letter && words.len() >= 2 && !stray_initial
    }
}

impl StyleRules for IeeeRules {
    fn style(&self) -> CitationStyle {
        CitationStyle::Ieee
    }

    fn is_head(&self, text: &str) -> bool {
        IEEE_HEAD.is_match(text)
    }

    fn find_year_markers(&self, text: &str) -> Vec<Range<usize>> {
        IEEE_NUMBER.find_iter(text).map(|m| m.range()).collect()
    }

    fn extract_title(&self, text: &str) -> Option<String> {
        let mut best: Option<&str> = None;
        for caps in QUOTED.captures_iter(text) {
            let Some(m) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            // Strictly longer only, so the first of equal-length spans wins.
            if best.is_none_or(|b| m.as_str().chars().count() > b.chars().count()) {
                best = Some(m.as_str());
            }
        }

        if let Some(quoted) = best {
            let title = quoted.trim().trim_end_matches([',', '.']).trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
        Self::fallback_title(text)
    }

    fn detects(&self, text: &str) -> bool {
        IEEE_HEAD.is_match(text) || QUOTED.is_match(text)
    }
}

// ── APA ──

static APA_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[(（](?:\d{4}[a-c]?|n\.\s?d\.)[)）][.．。]").unwrap());

impl StyleRules for ApaRules {
    fn style(&self) -> CitationStyle {
        CitationStyle::Apa
    }

    fn is_head(&self, text: &str) -> bool {
        // CJK entries run straight on after the full-width stop.
        self.find_year_markers(text).iter().any(|m| {
            text[m.clone()].ends_with(['。', '．'])
                || text[m.end..].chars().next().is_none_or(char::is_whitespace)
        })
    }

    fn find_year_markers(&self, text: &str) -> Vec<Range<usize>> {
        APA_MARKER
            .find_iter(text)
            // Volume(issue) and page ranges put digits right before the paren.
            .filter(|m| !digit_before(text, m.start(), PRECEDING_WINDOW))
            .map(|m| m.range())
            .collect()
    }

    fn extract_title(&self, text: &str) -> Option<String> {
        let marker = self.find_year_markers(text).into_iter().next()?;
        title_after(text, marker.end)
    }

    fn detects(&self, text: &str) -> bool {
        !self.find_year_markers(text).is_empty()
    }
}

// ── APA-like ──

static APA_LIKE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,.，．]\s*(\d{4})[.．]").unwrap());
static APA_LIKE_FULLWIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,，]\s*(\d{4}[a-c]?)\s*[,，]\s*[.．。]").unwrap());
static TRAILING_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{2,}").unwrap());
/// An arXiv identifier, with optional version and `[cs.CL]`-style category,
/// ending right before a marker. A bare identifier is already caught by the
/// digit window; the category tag pushes its digits out of that window.
static ARXIV_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv:\s*\d{4}\.\d{4,5}(?:v\d+)?(?:\s*\[[^\]]*\])?\s*$").unwrap()
});
static AUTHOR_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\p{Lu}[\p{L}'’\-]+,\s*(?:\p{Lu}\.\s*)+|\p{Han}{2,4}[，,、])").unwrap()
});

impl StyleRules for ApaLikeRules {
    fn style(&self) -> CitationStyle {
        CitationStyle::ApaLike
    }

    fn is_head(&self, text: &str) -> bool {
        AUTHOR_HEAD.is_match(text) && !self.find_year_markers(text).is_empty()
    }

    fn find_year_markers(&self, text: &str) -> Vec<Range<usize>> {
        let primary = APA_LIKE_MARKER.find_iter(text).filter(|m| {
            let after = &text[m.end()..];
            !digit_before(text, m.start(), PRECEDING_WINDOW)
                && !TRAILING_ALNUM.is_match(after)
                && !ARXIV_TAIL.is_match(&text[..m.start()])
        });
        let fullwidth = APA_LIKE_FULLWIDTH
            .find_iter(text)
            .filter(|m| !digit_before(text, m.start(), PRECEDING_WINDOW));

        let mut spans: Vec<Range<usize>> = primary.chain(fullwidth).map(|m| m.range()).collect();
        spans.sort_by_key(|r| r.start);
        let mut out: Vec<Range<usize>> = Vec::with_capacity(spans.len());
        for span in spans {
            if out.last().is_none_or(|prev| span.start >= prev.end) {
                out.push(span);
            }
        }
        out
    }

    fn extract_title(&self, text: &str) -> Option<String> {
        let marker = self.find_year_markers(text).into_iter().next()?;
        title_after(text, marker.end)
    }

    fn detects(&self, text: &str) -> bool {
        !self.find_year_markers(text).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[CitationStyle] = DEFAULT_STYLES;

    #[test]
    fn ieee_example() {
        let text = r#"[3] Lin, J. "Deep Learning Methods," IEEE Trans. 2019."#;
        assert_eq!(detect_style(text, ALL), CitationStyle::Ieee);
        assert_eq!(IEEE.extract_title(text).as_deref(), Some("Deep Learning Methods"));
        assert!(IEEE.is_head(text));
    }

    #[test]
    fn ieee_longest_quote_wins_first_on_tie() {
        let text = r#"[1] A. B, "Short," in "A longer quoted title," 2020."#;
        assert_eq!(IEEE.extract_title(text).as_deref(), Some("A longer quoted title"));
        let tie = r#"[1] "Alpha beta," "Gamma delt," 2020."#;
        assert_eq!(IEEE.extract_title(tie).as_deref(), Some("Alpha beta"));
    }

    #[test]
    fn ieee_curly_quotes() {
        let text = "[7] K. Lee, “Sparse coding for images,” Proc. CVPR, 2018.";
        assert_eq!(IEEE.extract_title(text).as_deref(), Some("Sparse coding for images"));
    }

    #[test]
    fn ieee_fallback_skips_authors_and_et_al() {
        let text = "[2] J. Smith, K. Lee, et al. Robust parsing of citations, Proc. ACL, 2020.";
        assert_eq!(
            IEEE.extract_title(text).as_deref(),
            Some("Robust parsing of citations")
        );
        let et_al = "[4] Smith et al. Graph methods revisited. Journal, 2021.";
        assert_eq!(
            IEEE.extract_title(et_al).as_deref(),
            Some("Graph methods revisited")
        );
    }

    #[test]
    fn apa_example() {
        let text = "Huang, C. (2021). A study of citation networks. Journal X, 5(2), 10-20.";
        assert_eq!(detect_style(text, ALL), CitationStyle::Apa);
        assert_eq!(
            APA.extract_title(text).as_deref(),
            Some("A study of citation networks")
        );
        assert!(APA.is_head(text));
        assert!(APA.is_head("王小明（2019）。教育研究方法。台北：五南。"));
    }

    #[test]
    fn apa_full_width_and_no_date() {
        let text = "王小明（2019）。人工智慧研究。教育期刊，3(2)，1-10。";
        assert_eq!(detect_style(text, ALL), CitationStyle::Apa);
        assert_eq!(APA.extract_title(text).as_deref(), Some("人工智慧研究"));

        let nd = "Doe, J. (n.d.). Undated report on things. Publisher.";
        assert_eq!(APA.extract_title(nd).as_deref(), Some("Undated report on things"));
    }

    #[test]
    fn apa_title_keeps_decimals() {
        let text = "Kim, S. (2020). Release 2.0 of the toolkit. Software Journal.";
        assert_eq!(
            APA.extract_title(text).as_deref(),
            Some("Release 2.0 of the toolkit")
        );
        let q = "Kim, S. (2020). Is attention all you need? Journal, 1.";
        assert_eq!(APA.extract_title(q).as_deref(), Some("Is attention all you need?"));
    }

    #[test]
    fn year_preceded_by_digit_is_rejected() {
        assert!(APA.find_year_markers("Journal 12(2019). pages").is_empty());
        assert!(APA_LIKE.find_year_markers("pp. 102-2020.").is_empty());
        assert!(APA_LIKE.find_year_markers("vol. 3, 2020.").is_empty());
        assert_eq!(APA_LIKE.find_year_markers("Smith, J., 2019. Title.").len(), 1);
    }

    #[test]
    fn apa_like_rejects_identifier_suffixes() {
        assert!(
            APA_LIKE
                .find_year_markers("see https://x.org/ab.cdef.2019.ab12 online")
                .is_empty()
        );
    }

    #[test]
    fn apa_like_rejects_year_after_arxiv_id() {
        assert!(
            APA_LIKE
                .find_year_markers("Devlin, J., BERT. arXiv:1810.04805. 2018.")
                .is_empty()
        );
        assert!(
            APA_LIKE
                .find_year_markers("Devlin, J., BERT. arXiv:1810.04805v2 [cs.CL], 2018.")
                .is_empty()
        );
        assert_eq!(
            APA_LIKE
                .find_year_markers("Devlin, J., BERT. Proc. NAACL [long papers], 2018.")
                .len(),
            1
        );
    }

    #[test]
    fn apa_like_title_and_head() {
        let text = "Lee, K., 2020. Title two here. Journal B.";
        assert_eq!(detect_style(text, ALL), CitationStyle::ApaLike);
        assert_eq!(APA_LIKE.extract_title(text).as_deref(), Some("Title two here"));
        assert!(APA_LIKE.is_head(text));
        assert!(!APA_LIKE.is_head("continued text, 2020. More"));
    }

    #[test]
    fn apa_like_full_width_form() {
        let text = "陳大文，2018，。資料探勘導論。";
        assert_eq!(APA_LIKE.find_year_markers(text).len(), 1);
        assert_eq!(APA_LIKE.extract_title(text).as_deref(), Some("資料探勘導論"));
    }

    #[test]
    fn precedence_prefers_ieee() {
        let text = "[1] Smith, J. (2020). A title. Journal.";
        assert_eq!(detect_style(text, ALL), CitationStyle::Ieee);
        assert_eq!(
            detect_style(text, &[CitationStyle::Apa, CitationStyle::ApaLike]),
            CitationStyle::Apa
        );
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(detect_style("Just a heading line", ALL), CitationStyle::Unknown);
        assert!(rules_for(CitationStyle::Unknown).is_none());
    }
}
