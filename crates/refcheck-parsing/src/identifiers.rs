use once_cell::sync::Lazy;
use regex::Regex;

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
fn clean_doi(doi: &str) -> String {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);

    loop {
        let trimmed = [(')', '('), (']', '['), ('}', '{')]
            .iter()
            .find(|(close, open)| {
                doi.ends_with(*close) && doi.matches(*close).count() > doi.matches(*open).count()
            })
            .map(|_| doi[..doi.len() - 1].trim_end_matches(['.', ',', ';', ':']));
        match trimmed {
            Some(shorter) => doi = shorter,
            None => break,
        }
    }

    doi.to_string()
}

/// Extract a DOI from reference text.
///
/// Handles formats like:
/// - `10.1234/example`
/// - `doi:10.1234/example` / `DOI: 10.1234/example`
/// - `https://doi.org/10.1234/example`
/// - `http://dx.doi.org/10.1234/example`
///
/// DOIs containing parentheses (e.g. `10.1016/0021-9681(87)90171-8`) keep
/// them when balanced.
pub fn extract_doi(text: &str) -> Option<String> {
    // Prefixed forms first: the prefix pins down where the DOI starts.
    static PREFIXED: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(?:https?://(?:dx\.)?doi\.org/|doi:\s*)(10\.\d{4,9}/[-._;()/:\[\]A-Za-z0-9]+)",
        )
        .unwrap()
    });
    if let Some(caps) = PREFIXED.captures(text) {
        return caps.get(1).map(|m| clean_doi(m.as_str()));
    }

    static BARE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"10\.\d{4,9}/[-._;()/:\[\]A-Za-z0-9]+").unwrap());
    BARE.find(text).map(|m| clean_doi(m.as_str()))
}
