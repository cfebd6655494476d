//! Text normalization (spec layer L1): ligature expansion, hyphenation
//! repair across line breaks, and whitespace canonicalization.
//!
//! Runs once over the whole document before section location, so that
//! downstream regexes never have to account for PDF-extraction artifacts.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ParsingConfig;

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Expand typographic ligatures into their plain letter sequences.
pub fn expand_ligatures(text: &str) -> String {
    let mut out = text.to_string();
    for (lig, repl) in LIGATURES {
        if out.contains(*lig) {
            out = out.replace(*lig, repl);
        }
    }
    out
}

static HYPHEN_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]+)-\s*\n\s*([a-z]+)").unwrap());

/// Rejoin words split across a line break by a hyphen.
///
/// A hyphen immediately before a line break is ambiguous: it can be a
/// PDF-layout artifact (`hyphen-\nation` → `hyphenation`) or a genuine
/// compound word whose second half lands on the next line
/// (`model-\nbased` → `model-based`). The hyphen is kept when the suffix
/// after the break is a known compounding suffix, dropped otherwise.
pub fn repair_hyphenation(text: &str, config: &ParsingConfig) -> String {
    HYPHEN_BREAK_RE
        .replace_all(text, |caps: &regex::Captures| {
            let prefix = &caps[1];
            let suffix = &caps[2];
            if config.compound_suffixes().contains(&suffix.to_lowercase()) {
                format!("{prefix}-{suffix}")
            } else {
                format!("{prefix}{suffix}")
            }
        })
        .to_string()
}

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapse runs of horizontal whitespace and excessive blank lines.
pub fn canonicalize_whitespace(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    BLANK_LINES_RE.replace_all(&collapsed, "\n\n").to_string()
}

/// Run the full L1 normalization pipeline: ligatures, hyphenation repair,
/// then whitespace canonicalization.
pub fn normalize_text(text: &str, config: &ParsingConfig) -> String {
    let text = expand_ligatures(text);
    let text = repair_hyphenation(&text, config);
    canonicalize_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_fi_ligature() {
        assert_eq!(expand_ligatures("e\u{FB03}cient"), "efficient");
    }

    #[test]
    fn expands_all_ligatures() {
        let text = "\u{FB00}\u{FB01}\u{FB02}\u{FB03}\u{FB04}\u{FB05}\u{FB06}";
        assert_eq!(expand_ligatures(text), "fffiflffifflstst");
    }

    #[test]
    fn repairs_hyphenation_with_known_suffix() {
        let config = ParsingConfig::default();
        let text = "a model-\nbased approach";
        assert_eq!(repair_hyphenation(text, &config), "a model-based approach");
    }

    #[test]
    fn repairs_hyphenation_drops_hyphen_for_unknown_suffix() {
        let config = ParsingConfig::default();
        let text = "a hyphen-\nation example";
        assert_eq!(repair_hyphenation(text, &config), "a hyphenation example");
    }

    #[test]
    fn canonicalizes_whitespace() {
        let text = "a   b\t\tc\n\n\n\nd";
        assert_eq!(canonicalize_whitespace(text), "a b c\n\nd");
    }

    #[test]
    fn full_pipeline() {
        let config = ParsingConfig::default();
        let text = "e\u{FB03}cient   model-\nbased    systems";
        assert_eq!(normalize_text(text, &config), "efficient model-based systems");
    }
}
