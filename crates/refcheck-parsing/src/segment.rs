//! Turning a reference section's lines into one string per citation.
//!
//! Lines are merged when a reference wraps and split when one line holds
//! several references. Everything here works on whitespace-collapsed raw
//! text; style rules recognize full-width punctuation directly, so byte
//! offsets stay valid for cutting.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use refcheck_core::normalize::{Strictness, collapse_whitespace, normalize};
use refcheck_core::{CitationStyle, SourceKind, TextLine};

use crate::config::ParsingConfig;
use crate::style::{detect_style, rules_for};

static IEEE_FIRST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[1\]").unwrap());
static IEEE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());

/// An author initial ("K.") that is followed by whitespace or the window end.
static INITIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Lu}\.").unwrap());
static TRAILING_INITIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\p{Lu}\.\s*)+$").unwrap());
static TRAILING_SURNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{Lu}[\p{L}'’\-]+,\s*$").unwrap());

/// Year-marker spans of the date-based styles (APA and APA-like) that are
/// enabled, sorted and non-overlapping.
pub fn year_markers(text: &str, styles: &[CitationStyle]) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = [CitationStyle::Apa, CitationStyle::ApaLike]
        .into_iter()
        .filter(|s| styles.contains(s))
        .filter_map(rules_for)
        .flat_map(|rules| rules.find_year_markers(text))
        .collect();
    spans.sort_by_key(|r| (r.start, r.end));

    let mut out: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        if out.last().is_none_or(|prev| span.start >= prev.end) {
            out.push(span);
        }
    }
    out
}

/// Byte offset `n` characters before `pos`, not earlier than `floor`.
fn chars_back(text: &str, pos: usize, n: usize, floor: usize) -> usize {
    let start = text[..pos]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(pos, |(i, _)| i);
    start.max(floor)
}

/// Where to cut before the marker at `marker_start`.
///
/// Starts `backoff` characters before the marker. Inside that window an
/// author initial moves the cut to the start of the author name; failing
/// that, a sentence end moves it just past the terminal punctuation;
/// failing that, a cut inside a word moves back to the word start.
fn cut_point(text: &str, marker_start: usize, backoff: usize, floor: usize) -> usize {
    let window_start = chars_back(text, marker_start, backoff, floor);
    let window = &text[window_start..marker_start];

    let initial = INITIAL
        .find_iter(window)
        .filter(|m| {
            window[m.end()..]
                .chars()
                .next()
                .is_none_or(char::is_whitespace)
        })
        .last();
    if let Some(m) = initial {
        let mut cut = window_start + m.start();
        if let Some(t) = TRAILING_INITIALS.find(&text[floor..cut]) {
            cut = floor + t.start();
        }
        if let Some(s) = TRAILING_SURNAME.find(&text[floor..cut]) {
            cut = floor + s.start();
        }
        return cut;
    }

    if let Some((i, c)) = window
        .char_indices()
        .rev()
        .find(|(_, c)| matches!(c, '.' | '。' | '．'))
    {
        return window_start + i + c.len_utf8();
    }

    let mut cut = window_start;
    while cut > floor {
        let prev = text[..cut].chars().next_back();
        let next = text[cut..].chars().next();
        let inside_word = prev.is_some_and(|c| !c.is_whitespace())
            && next.is_some_and(|c| !c.is_whitespace());
        if !inside_word {
            break;
        }
        cut -= prev.map_or(1, char::len_utf8);
    }
    cut
}

/// Split a line holding several citations, one fragment per marker.
///
/// Fragments are trimmed; empty ones are dropped.
pub fn split_multi_marker(text: &str, markers: &[Range<usize>], backoff: usize) -> Vec<String> {
    let mut cuts = vec![0];
    for marker in markers.iter().skip(1) {
        let floor = cuts.last().copied().unwrap_or(0);
        cuts.push(cut_point(text, marker.start, backoff, floor));
    }
    cuts.push(text.len());

    cuts.windows(2)
        .map(|w| text[w[0]..w[1]].trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_head(text: &str, styles: &[CitationStyle]) -> bool {
    styles
        .iter()
        .filter_map(|s| rules_for(*s))
        .any(|rules| rules.is_head(text))
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(std::mem::take(current));
    }
}

/// Numbered lists: everything from the `[1]` line on is rejoined and cut
/// before each `[n]` that starts the text or follows whitespace.
fn split_ieee(lines: &[String], first: usize) -> Vec<String> {
    let mut out = Vec::new();
    let leading = lines[..first].join(" ");
    if !leading.is_empty() {
        out.push(leading);
    }

    let joined = lines[first..].join(" ");
    let mut cuts: Vec<usize> = IEEE_NUMBER
        .find_iter(&joined)
        .map(|m| m.start())
        .filter(|&pos| pos == 0 || joined[..pos].ends_with(char::is_whitespace))
        .collect();
    cuts.push(joined.len());

    out.extend(
        cuts.windows(2)
            .map(|w| joined[w[0]..w[1]].trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string),
    );
    out
}

/// Segment a reference section into one string per citation.
pub fn segment(lines: &[TextLine], source: SourceKind, config: &ParsingConfig) -> Vec<String> {
    let texts: Vec<String> = lines
        .iter()
        .map(|l| collapse_whitespace(&l.text))
        .filter(|t| !t.is_empty())
        .collect();
    let styles = config.styles();

    if source != SourceKind::Paragraphs
        && config.ieee_fast_path
        && styles.contains(&CitationStyle::Ieee)
    {
        if let Some(first) = texts.iter().position(|t| IEEE_FIRST.is_match(t)) {
            let out = split_ieee(&texts, first);
            tracing::debug!(records = out.len(), "segmented numbered list");
            return out;
        }
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for text in texts {
        let markers = year_markers(&text, styles);
        if markers.len() >= 2 {
            flush(&mut current, &mut out);
            let fragments = split_multi_marker(&text, &markers, config.split_backoff_chars);
            tracing::debug!(fragments = fragments.len(), "split multi-citation line");
            out.extend(fragments);
            continue;
        }

        if source == SourceKind::Paragraphs || is_head(&text, styles) {
            flush(&mut current, &mut out);
            current = text;
        } else if current.is_empty() {
            current = text;
        } else {
            current.push(' ');
            current.push_str(&text);
        }
    }
    flush(&mut current, &mut out);

    if source == SourceKind::Paragraphs && out.len() >= 2 {
        let first = normalize(&out[0], Strictness::Light);
        if detect_style(&first, styles) == CitationStyle::Unknown {
            let stray = out.remove(0);
            tracing::debug!(fragment = %stray, "merging unclassified first paragraph forward");
            out[0] = format!("{stray} {}", out[0]);
        }
    }

    tracing::debug!(records = out.len(), ?source, "segmented reference section");
    out
}
