//! Shared text utilities: query-word extraction, DOI/arXiv ID extraction.
//!
//! Used by the validator for offline FTS queries (DBLP, ACL) and by
//! `refguard-parsing` for per-reference identifier extraction, so both
//! sides of the pipeline agree on what counts as a DOI, an arXiv ID, and
//! a "significant" word.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "and", "or", "for", "to", "in", "on", "with", "by",
    ]
    .into_iter()
    .collect()
});

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"10\.\d{4,9}/\S+").unwrap());
static ARXIV_NEW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}\.\d{4,5}(?:v\d+)?").unwrap());
static ARXIV_OLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7}").unwrap());

/// Default number of query words to extract for an offline FTS lookup.
pub const DEFAULT_QUERY_WORD_COUNT: usize = 6;

/// Extract the first DOI found in `text`, stripped of common trailing
/// punctuation that PDF extraction tends to glue onto the end.
pub fn extract_doi(text: &str) -> Option<String> {
    let m = DOI_RE.find(text)?;
    Some(trim_trailing_punct(m.as_str()))
}

/// Extract the first arXiv identifier found in `text`, new-style
/// (`2401.01234`) or old-style (`cs.CR/0304002`).
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    if let Some(m) = ARXIV_NEW_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    ARXIV_OLD_RE.find(text).map(|m| m.as_str().to_string())
}

fn trim_trailing_punct(s: &str) -> String {
    s.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')' | ']' | '>'))
        .to_string()
}

/// Extract up to `n` significant query words from a title for offline FTS
/// lookups.
///
/// Lowercases, tokenizes on alphanumeric runs, and drops stop words. If
/// fewer than 3 significant tokens remain (e.g. a title that's mostly
/// stop words, or very short), falls back to the first `n` tokens of the
/// unfiltered title so the query is never empty.
pub fn get_query_words(title: &str, n: usize) -> Vec<String> {
    static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

    let all_words: Vec<String> = WORD_RE
        .find_iter(title)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    let significant: Vec<String> = all_words
        .iter()
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .cloned()
        .collect();

    if significant.len() >= 3 {
        significant.into_iter().take(n).collect()
    } else {
        all_words.into_iter().take(n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_doi() {
        assert_eq!(
            extract_doi("see doi.org 10.1145/3372297.3417247 for details"),
            Some("10.1145/3372297.3417247".to_string())
        );
    }

    #[test]
    fn extracts_doi_trims_trailing_punct() {
        assert_eq!(
            extract_doi("DOI: 10.1145/3372297.3417247."),
            Some("10.1145/3372297.3417247".to_string())
        );
    }

    #[test]
    fn no_doi_returns_none() {
        assert_eq!(extract_doi("no identifier here"), None);
    }

    #[test]
    fn extracts_new_style_arxiv_id() {
        assert_eq!(
            extract_arxiv_id("arXiv:2401.01234v2"),
            Some("2401.01234v2".to_string())
        );
    }

    #[test]
    fn extracts_old_style_arxiv_id() {
        assert_eq!(
            extract_arxiv_id("arXiv:cs.CR/0304002"),
            Some("cs.CR/0304002".to_string())
        );
    }

    #[test]
    fn query_words_drops_stop_words() {
        let words = get_query_words("The Study of Attention in Neural Networks", 6);
        assert_eq!(words, vec!["study", "attention", "neural", "networks"]);
    }

    #[test]
    fn query_words_respects_limit() {
        let words = get_query_words(
            "Detecting Hallucinated References in Large Academic Corpora With Care",
            3,
        );
        assert_eq!(words.len(), 3);
    }

    #[test]
    fn query_words_falls_back_when_mostly_stop_words() {
        // Only "to" and "of" survive stop-word filtering — falls back to
        // the unfiltered tokens instead of returning an empty query.
        let words = get_query_words("To of in", 6);
        assert_eq!(words, vec!["to", "of", "in"]);
    }
}
