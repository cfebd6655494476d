//! Author-list extraction from a single reference string.
//!
//! Distinct from [`refguard_core::authors`], which *validates* an author
//! list against what a database returned — this module only pulls a list
//! of names out of raw citation text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ParsingConfig;

static EM_DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[—–_]{2,}\.?\s").unwrap());

/// Whether `text` opens with the em-dash "same authors as the previous
/// entry" convention (`———. Title Two. ...`).
pub fn is_em_dash_continuation(text: &str) -> bool {
    EM_DASH_RE.is_match(text)
}

// Authors run up to the first year marker: "(2020)" or a bare "2020."
static AUTHOR_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?(?:19|20)\d{2}[a-z]?\)?\.?").unwrap());

// Quoted-title styles put the title before any year marker appears, so
// the author list also ends at the first opening quote.
static QUOTE_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["“]"#).unwrap());

// A surname, optionally preceded by a lowercase connector particle
// ("van Bavel", "de la Cruz", "von Neumann").
const SURNAME_PATTERN: &str = r"(?:(?:van|von|de|del|la|di)\s+){0,2}[A-Z][A-Za-z'\-]+";

// One author, in "Surname, I. I." (AAAI/APA), "First Surname" (full-name),
// or "I. Surname" (bare-initial) form.
static AUTHOR_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:{surname},\s*(?:[A-Z]\.\s*){{1,3}}|[A-Z][a-z]+(?:\s+[A-Z]\.)?\s+{surname}|[A-Z]\.\s*(?:[A-Z]\.\s*)?{surname})",
        surname = SURNAME_PATTERN
    ))
    .unwrap()
});

/// Extract author names from the leading portion of a reference string.
///
/// `previous_authors` backs the em-dash convention, where a reference
/// reuses the author list of the one before it.
pub fn extract_authors(
    text: &str,
    previous_authors: Option<&[String]>,
    config: &ParsingConfig,
) -> Vec<String> {
    if is_em_dash_continuation(text) {
        return previous_authors.map(|a| a.to_vec()).unwrap_or_default();
    }

    let span = leading_author_span(text);
    AUTHOR_UNIT_RE
        .find_iter(span)
        .map(|m| m.as_str().trim().to_string())
        .take(config.max_authors)
        .collect()
}

// The author list runs up to whichever title marker comes first: a bare
// year (AAAI/ACM style) or an opening quote (quoted-title style).
fn leading_author_span(text: &str) -> &str {
    let year_end = AUTHOR_BOUNDARY_RE.find(text).map(|m| m.start());
    let quote_end = QUOTE_START_RE.find(text).map(|m| m.start());
    let end = match (year_end, quote_end) {
        (Some(y), Some(q)) => y.min(q),
        (Some(y), None) => y,
        (None, Some(q)) => q,
        (None, None) => text.len(),
    };
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_aaai_style_authors() {
        let config = ParsingConfig::default();
        let authors = extract_authors("Smith, J. and Doe, A. 2020. A Paper.", None, &config);
        assert_eq!(authors, vec!["Smith, J.", "Doe, A."]);
    }

    #[test]
    fn extracts_full_name_with_connector_particle() {
        let config = ParsingConfig::default();
        let authors =
            extract_authors("Jay van Bavel, Alice Jones. 2019. A Paper.", None, &config);
        assert_eq!(authors, vec!["Jay van Bavel", "Alice Jones"]);
    }

    #[test]
    fn extracts_bare_initial_surname_authors() {
        let config = ParsingConfig::default();
        let text = concat!(
            "J. Smith and A. Jones, \"Deep Learning for Natural Language Processing,\" ",
            "in Proc. ACL, 2023."
        );
        let authors = extract_authors(text, None, &config);
        assert_eq!(authors, vec!["J. Smith", "A. Jones"]);
    }

    #[test]
    fn em_dash_reuses_previous_authors() {
        let config = ParsingConfig::default();
        let prev = vec!["Smith, J.".to_string()];
        let authors = extract_authors("———. 2021. Another Paper.", Some(&prev), &config);
        assert_eq!(authors, prev);
    }

    #[test]
    fn em_dash_without_previous_authors_is_empty() {
        let config = ParsingConfig::default();
        let authors = extract_authors("———. 2021. Another Paper.", None, &config);
        assert!(authors.is_empty());
    }

    #[test]
    fn no_authors_found_returns_empty() {
        let config = ParsingConfig::default();
        let authors = extract_authors("2020. an untitled entry with no names", None, &config);
        assert!(authors.is_empty());
    }

    #[test]
    fn respects_max_authors_limit() {
        let config = ParsingConfig::default();
        let names: Vec<String> = ('a'..='z').map(|c| format!("Author{c}, A.")).collect();
        let text = format!("{} 2020. A Paper.", names.join(" and "));
        let authors = extract_authors(&text, None, &config);
        assert_eq!(authors.len(), config.max_authors);
    }
}
