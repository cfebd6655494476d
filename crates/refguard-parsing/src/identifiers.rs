//! Per-reference identifier extraction: DOI, arXiv ID, and the bare-URL
//! check used to decide whether a URL-only reference survives.
//!
//! DOI/arXiv regexes themselves live in `refguard_core::text_utils`, so
//! the validator's `doi_info`/`arxiv_info` and this crate's per-reference
//! extraction agree on what counts as an identifier.

use once_cell::sync::Lazy;
use regex::Regex;

pub use refguard_core::{extract_arxiv_id, extract_doi};

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

/// Whether `text` is effectively nothing but a single URL, optionally with
/// a short label in front and trailing punctuation.
pub fn is_url_only(text: &str) -> bool {
    let trimmed = text.trim();
    let urls: Vec<_> = URL_RE.find_iter(trimmed).collect();
    if urls.len() != 1 {
        return false;
    }
    let m = &urls[0];
    let before = trimmed[..m.start()].trim();
    let after = trimmed[m.end()..].trim_matches(|c: char| c.is_whitespace() || c == '.');
    // A label before the URL must be short (e.g. "[3] " or "Available: "),
    // and nothing meaningful may follow it.
    before.chars().count() <= 20 && after.is_empty()
}

/// Extract the lowercased host of the first URL in `text`, without a
/// leading `www.`.
pub fn extract_url_host(text: &str) -> Option<String> {
    let m = URL_RE.find(text)?;
    let without_scheme = m.as_str().splitn(2, "://").nth(1)?;
    let host = without_scheme.split(['/', '?', '#']).next()?;
    Some(host.trim_start_matches("www.").to_lowercase())
}

/// Whether a URL-only reference should be kept because its host is on the
/// academic allowlist (e.g. ACM, IEEE, USENIX, arXiv, the DOI resolver).
pub fn is_academic_url(text: &str, allowlist: &[String]) -> bool {
    let Some(host) = extract_url_host(text) else {
        return false;
    };
    allowlist
        .iter()
        .any(|h| &host == h || host.ends_with(&format!(".{h}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_only_detects_bare_url() {
        assert!(is_url_only("https://example.com/paper.pdf"));
    }

    #[test]
    fn url_only_allows_short_label() {
        assert!(is_url_only("[12] https://arxiv.org/abs/2401.01234"));
    }

    #[test]
    fn url_only_rejects_trailing_content() {
        assert!(!is_url_only(
            "See https://example.com/paper.pdf for the full study of widgets"
        ));
    }

    #[test]
    fn url_only_rejects_multiple_urls() {
        assert!(!is_url_only(
            "https://example.com/a https://example.com/b"
        ));
    }

    #[test]
    fn extracts_host() {
        assert_eq!(
            extract_url_host("https://www.arxiv.org/abs/2401.01234"),
            Some("arxiv.org".to_string())
        );
    }

    #[test]
    fn academic_url_accepts_subdomain() {
        let allow = vec!["acm.org".to_string()];
        assert!(is_academic_url("https://dl.acm.org/doi/10.1145/123", &allow));
    }

    #[test]
    fn academic_url_rejects_unlisted_host() {
        let allow = vec!["acm.org".to_string()];
        assert!(!is_academic_url("https://example.com/paper", &allow));
    }

    #[test]
    fn doi_and_arxiv_reexports_work() {
        assert_eq!(
            extract_doi("10.1145/3372297.3417247"),
            Some("10.1145/3372297.3417247".to_string())
        );
        assert_eq!(
            extract_arxiv_id("2401.01234"),
            Some("2401.01234".to_string())
        );
    }
}
