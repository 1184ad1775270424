//! Locating the reference list within a document's lines.
//!
//! The scan runs from the last line upward so that the bottom-most heading
//! wins; body text mentioning "references" higher up is never reached.

use once_cell::sync::Lazy;
use regex::Regex;
use refcheck_core::normalize::{Strictness, normalize};
use refcheck_core::{DetectionMethod, ReferenceSection, TextLine};

use crate::ParsingError;
use crate::config::ParsingConfig;

/// Numbering in front of a heading: "5.", "5.1", "VII", "iv)", "五、", "第五章".
static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:第[一二三四五六七八九十百零〇\d]+[章節节篇部]\s*|(?:\d+(?:\.\d+)*|[IVXLC]+|[ivxlc]+)(?:[.)、]\s*|\s+)|[一二三四五六七八九十百]+(?:[、.)]\s*|\s+))",
    )
    .unwrap()
});

/// Sentence punctuation that disqualifies a heading candidate.
static SENTENCE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,;:，。；：]").unwrap());

/// Lines that look like the start or body of a reference entry.
static REFERENCE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\d{4}[a-c]?\)|^\s*\[\d+\]|\p{Lu}[\p{L}'’\-]+,\s*\p{Lu}\.").unwrap()
});

/// A line reduced to what heading matching compares.
struct HeadingText {
    /// Lowercased, light-normalized, numbering prefix and trailing colon removed.
    body: String,
    numbered: bool,
}

fn heading_text(line: &str) -> HeadingText {
    let light = normalize(line, Strictness::Light);
    let (body, numbered) = match NUMBER_PREFIX.find(&light) {
        Some(m) if m.end() < light.len() => (&light[m.end()..], true),
        _ => (light.as_str(), false),
    };
    let body = body.trim().trim_end_matches([':', '：']).trim_end();
    HeadingText {
        body: body.to_lowercase(),
        numbered,
    }
}

/// Heading candidate: short, and free of sentence punctuation once the
/// numbering prefix is gone.
fn is_candidate(h: &HeadingText, max_chars: usize) -> bool {
    !h.body.is_empty() && h.body.chars().count() <= max_chars && !SENTENCE_PUNCT.is_match(&h.body)
}

/// The detection method if `line` is a reference heading.
fn heading_match(line: &str, config: &ParsingConfig) -> Option<DetectionMethod> {
    let h = heading_text(line);
    if !is_candidate(&h, config.heading_max_chars) {
        return None;
    }
    if !config.heading_keywords.iter().any(|kw| *kw == h.body) {
        return None;
    }
    Some(if h.numbered {
        DetectionMethod::ChapteredHeading
    } else {
        DetectionMethod::Heading
    })
}

/// A stop heading: a stop keyword, optionally numbered, optionally followed
/// by a short label ("Appendix A", "附錄一：問卷").
fn is_stop_heading(line: &str, config: &ParsingConfig) -> bool {
    let h = heading_text(line);
    if h.body.chars().count() > config.heading_max_chars * 2 {
        return false;
    }
    config.stop_keywords.iter().any(|kw| {
        let Some(rest) = h.body.strip_prefix(kw.as_str()) else {
            return false;
        };
        let label = rest
            .split([':', '：'])
            .next()
            .unwrap_or_default()
            .trim();
        label.chars().count() <= 3 && !SENTENCE_PUNCT.is_match(label)
    })
}

/// Noisy heading: a keyword somewhere in a short line once spaces are gone
/// ("R E F E R E N C E S", "References 23").
fn is_fuzzy_heading(line: &str, config: &ParsingConfig) -> bool {
    let light = normalize(line, Strictness::Light);
    if SENTENCE_PUNCT.is_match(light.trim_end_matches([':', '：'])) {
        return false;
    }
    let compact: String = light
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if compact.is_empty() || compact.chars().count() > config.heading_max_chars * 2 {
        return false;
    }
    config.heading_keywords.iter().any(|kw| {
        let kw: String = kw.chars().filter(|c| !c.is_whitespace()).collect();
        compact.contains(&kw)
    })
}

fn looks_like_reference(line: &str) -> bool {
    REFERENCE_SHAPE.is_match(&normalize(line, Strictness::Light))
}

/// Lines after `start` up to (not including) the first stop heading.
fn collect_section(lines: &[TextLine], start: usize, config: &ParsingConfig) -> Vec<TextLine> {
    lines[start + 1..]
        .iter()
        .take_while(|l| !is_stop_heading(&l.text, config))
        .cloned()
        .collect()
}

/// Find the reference section.
///
/// First pass: the bottom-most exact (or numbered) keyword heading with a
/// non-empty body. Second pass: the bottom-most noisy keyword line followed
/// within `shape_lookahead` lines by something reference-shaped.
pub fn locate_section(
    lines: &[TextLine],
    config: &ParsingConfig,
) -> Result<ReferenceSection, ParsingError> {
    for i in (0..lines.len()).rev() {
        let Some(detection) = heading_match(&lines[i].text, config) else {
            continue;
        };
        let body = collect_section(lines, i, config);
        if body.is_empty() {
            tracing::debug!(line = lines[i].number, "empty section under heading, scanning upward");
            continue;
        }
        tracing::debug!(
            line = lines[i].number,
            heading = %lines[i].text,
            method = detection.as_str(),
            "reference section located"
        );
        return Ok(ReferenceSection {
            lines: body,
            start_marker: Some(lines[i].text.clone()),
            detection,
        });
    }

    for i in (0..lines.len()).rev() {
        if !is_fuzzy_heading(&lines[i].text, config) {
            continue;
        }
        let shaped = lines[i + 1..]
            .iter()
            .take(config.shape_lookahead)
            .any(|l| looks_like_reference(&l.text));
        if !shaped {
            continue;
        }
        let body = collect_section(lines, i, config);
        if body.is_empty() {
            continue;
        }
        tracing::debug!(
            line = lines[i].number,
            heading = %lines[i].text,
            "reference section located by fuzzy heading"
        );
        return Ok(ReferenceSection {
            lines: body,
            start_marker: Some(lines[i].text.clone()),
            detection: DetectionMethod::FuzzyHeading,
        });
    }

    Err(ParsingError::SectionNotFound)
}

/// The whole document as a section, for when no heading was found.
pub fn whole_document(lines: &[TextLine]) -> ReferenceSection {
    ReferenceSection {
        lines: lines.to_vec(),
        start_marker: None,
        detection: DetectionMethod::WholeDocument,
    }
}
