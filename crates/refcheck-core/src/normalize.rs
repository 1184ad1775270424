//! Unicode folding and whitespace normalization for reference text.
//!
//! Every pattern match in the parsing crate and every title comparison in the
//! match pipeline goes through [`normalize`] with one of three strictness
//! levels.

use unicode_normalization::UnicodeNormalization;

/// How much of the input survives normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Keep punctuation (for pattern matching). Dash variants become `-`.
    Light,
    /// Keep letters, digits and spaces only, lowercased (for fuzzy comparison).
    Strict,
    /// [`Strictness::Strict`] plus dropping tokens made only of digits
    /// (page, volume and issue numbers).
    Loose,
}

/// Hyphen-like code points that PDF and word-processor output use in place of `-`.
const DASH_VARIANTS: &[char] = &[
    '\u{2010}', // hyphen
    '\u{2011}', // non-breaking hyphen
    '\u{2012}', // figure dash
    '\u{2013}', // en dash
    '\u{2014}', // em dash
    '\u{2015}', // horizontal bar
    '\u{2212}', // minus sign
    '\u{FE58}', // small em dash
    '\u{FE63}', // small hyphen-minus
    '\u{FF0D}', // full-width hyphen-minus
];

fn is_dash_variant(c: char) -> bool {
    DASH_VARIANTS.contains(&c)
}

/// Normalize a string.
///
/// NFKC folds full-width forms and compatibility ligatures (`ﬁ` → `fi`), dash
/// variants are collapsed, runs of whitespace become a single space and the
/// result is trimmed. Never fails; in light mode unknown code points pass
/// through, in strict and loose mode anything that is not a letter or digit
/// is dropped.
pub fn normalize(text: &str, strictness: Strictness) -> String {
    let folded = text.nfkc().map(|c| {
        if is_dash_variant(c) {
            '-'
        } else {
            c
        }
    });

    let filtered: String = match strictness {
        Strictness::Light => folded.collect(),
        Strictness::Strict | Strictness::Loose => folded
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect(),
    };

    let tokens = filtered.split_whitespace();
    if strictness == Strictness::Loose {
        tokens
            .filter(|t| !t.chars().all(|c| c.is_numeric()))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        tokens.collect::<Vec<_>>().join(" ")
    }
}

/// Collapse whitespace runs to one space and trim, without any Unicode folding.
///
/// Used where byte offsets into the original text must stay meaningful to
/// the caller (segmentation keeps raw characters).
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
