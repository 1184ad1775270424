//! Title comparison rules used by the match pipeline.

use crate::lookup::SearchHit;
use crate::normalize::{Strictness, normalize};
use crate::Tier;

/// Minimum similarity ratio for a secondary-search candidate to count as similar.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;

/// Primary-search rule: case-insensitive equality after trimming.
pub fn primary_title_matches(record_title: &str, found_title: &str) -> bool {
    let a = record_title.trim().to_lowercase();
    !a.is_empty() && a == found_title.trim().to_lowercase()
}

/// Similarity ratio (0.0..=1.0) of two strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Secondary-search rule.
///
/// Both titles are strictly normalized. The first candidate that is equal
/// gives TITLE_HIT_SECONDARY; otherwise the first whose similarity clears
/// `threshold` gives TITLE_SIMILAR. Candidates are visited in result order.
pub fn classify_secondary<'h>(
    record_title: &str,
    candidates: &'h [SearchHit],
    threshold: f64,
) -> Option<(Tier, &'h SearchHit)> {
    let wanted = normalize(record_title, Strictness::Strict);
    if wanted.is_empty() {
        return None;
    }

    for hit in candidates {
        let found = normalize(&hit.title, Strictness::Strict);
        if found.is_empty() {
            continue;
        }
        if found == wanted {
            return Some((Tier::TitleHitSecondary, hit));
        }
        if similarity(&wanted, &found) >= threshold {
            return Some((Tier::TitleSimilar, hit));
        }
    }
    None
}

/// Remedial rule: loose-normalized containment in either direction.
pub fn remedial_matches(raw_text: &str, found_title: &str) -> bool {
    let raw = normalize(raw_text, Strictness::Loose);
    let found = normalize(found_title, Strictness::Loose);
    if raw.is_empty() || found.is_empty() {
        return false;
    }
    raw.contains(&found) || found.contains(&raw)
}
