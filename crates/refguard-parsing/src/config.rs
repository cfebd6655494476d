//! Configuration for the parsing pipeline.
//!
//! `ParsingConfig` holds everything [`crate::section`], [`crate::title`],
//! [`crate::authors`], and [`crate::identifiers`] need that a paper's
//! house style might disagree with: section header/end regexes,
//! segmentation regexes, word-count floors, and a handful of configurable
//! word lists. Built via [`ParsingConfigBuilder`] or loaded from a
//! `[parsing]` TOML table through [`ParsingConfig::from_toml`].

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid regex in parsing config: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// How a configurable word list combines with its built-in default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListOverrideMode {
    /// Keep the built-in list as-is.
    #[default]
    Default,
    /// Use only the TOML-supplied values.
    Replace,
    /// Append the TOML-supplied values to the built-in list.
    Extend,
}

/// A TOML-configurable word list, e.g. `compound_suffixes` or
/// `academic_url_hosts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOverride {
    #[serde(default)]
    pub mode: ListOverrideMode,
    #[serde(default)]
    pub values: Vec<String>,
}

impl ListOverride {
    pub fn resolve(&self, defaults: &[&str]) -> Vec<String> {
        match self.mode {
            ListOverrideMode::Default => defaults.iter().map(|s| s.to_string()).collect(),
            ListOverrideMode::Replace => self.values.clone(),
            ListOverrideMode::Extend => defaults
                .iter()
                .map(|s| s.to_string())
                .chain(self.values.iter().cloned())
                .collect(),
        }
    }
}

const DEFAULT_COMPOUND_SUFFIXES: &[&str] = &[
    "centered",
    "based",
    "driven",
    "aware",
    "oriented",
    "specific",
    "related",
    "dependent",
    "independent",
    "like",
    "free",
    "friendly",
    "rich",
    "poor",
    "scale",
    "level",
    "order",
    "class",
    "type",
    "style",
    "wise",
    "fold",
    "shot",
    "step",
    "time",
    "world",
    "source",
    "domain",
    "task",
    "modal",
    "intensive",
    "efficient",
    "agnostic",
    "invariant",
    "sensitive",
    "grained",
    "agent",
    "site",
];

const DEFAULT_ACADEMIC_HOSTS: &[&str] =
    &["acm.org", "ieee.org", "usenix.org", "arxiv.org", "doi.org"];

// Patterns that mark the start of trailing venue/page boilerplate in a
// title candidate; the title is cut off at the first match.
const DEFAULT_VENUE_CUTOFFS: &[&str] = &[
    r"(?i)\s+in\s+proceedings\b.*$",
    r"(?i)\s+in\s+proc\.\s.*$",
    r"(?i)\s+proceedings\s+of\b.*$",
    r"(?i)\s+arxiv\s+preprint\b.*$",
    r"(?i)\s+in\s+[A-Z][A-Za-z&'\- ]{2,80}$",
];

fn default_fallback_fraction() -> f64 {
    0.7
}
fn default_min_title_words() -> usize {
    3
}
fn default_max_authors() -> usize {
    20
}
fn default_min_reference_chars() -> usize {
    20
}

/// Raw, TOML-deserializable overrides for [`ParsingConfig`]. Every field is
/// optional so a `[parsing]` table only needs to name what it changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsingConfigToml {
    pub section_header_regex: Option<String>,
    pub section_end_regex: Option<String>,
    pub fallback_fraction: Option<f64>,
    pub ieee_segment_regex: Option<String>,
    pub numbered_segment_regex: Option<String>,
    pub fallback_segment_regex: Option<String>,
    pub min_title_words: Option<usize>,
    pub max_authors: Option<usize>,
    pub min_reference_chars: Option<usize>,
    #[serde(default)]
    pub compound_suffixes: ListOverride,
    #[serde(default)]
    pub academic_url_hosts: ListOverride,
    #[serde(default)]
    pub venue_cutoffs: ListOverride,
}

/// Resolved parsing configuration used throughout the crate.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    pub(crate) section_header_re: Option<Regex>,
    pub(crate) section_end_re: Option<Regex>,
    pub fallback_fraction: f64,
    pub(crate) ieee_segment_re: Option<Regex>,
    pub(crate) numbered_segment_re: Option<Regex>,
    pub(crate) fallback_segment_re: Option<Regex>,
    pub min_title_words: usize,
    pub max_authors: usize,
    pub min_reference_chars: usize,
    pub(crate) compound_suffixes: HashSet<String>,
    pub(crate) academic_url_hosts: Vec<String>,
    pub(crate) venue_cutoff_res: Vec<Regex>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        ParsingConfigBuilder::new()
            .build()
            .expect("default parsing config regexes are always valid")
    }
}

impl ParsingConfig {
    /// Build a config from a `[parsing]` TOML table, falling back to
    /// built-in defaults for anything left unset.
    pub fn from_toml(raw: &ParsingConfigToml) -> Result<Self, ConfigError> {
        let mut builder = ParsingConfigBuilder::new();
        if let Some(re) = &raw.section_header_regex {
            builder = builder.section_header_regex(re);
        }
        if let Some(re) = &raw.section_end_regex {
            builder = builder.section_end_regex(re);
        }
        if let Some(f) = raw.fallback_fraction {
            builder = builder.fallback_fraction(f);
        }
        if let Some(re) = &raw.ieee_segment_regex {
            builder = builder.ieee_segment_regex(re);
        }
        if let Some(re) = &raw.numbered_segment_regex {
            builder = builder.numbered_segment_regex(re);
        }
        if let Some(re) = &raw.fallback_segment_regex {
            builder = builder.fallback_segment_regex(re);
        }
        if let Some(n) = raw.min_title_words {
            builder = builder.min_title_words(n);
        }
        if let Some(n) = raw.max_authors {
            builder = builder.max_authors(n);
        }
        if let Some(n) = raw.min_reference_chars {
            builder = builder.min_reference_chars(n);
        }
        builder = builder
            .compound_suffixes(raw.compound_suffixes.clone())
            .academic_url_hosts(raw.academic_url_hosts.clone())
            .venue_cutoffs(raw.venue_cutoffs.clone());
        builder.build()
    }

    pub fn academic_url_hosts(&self) -> &[String] {
        &self.academic_url_hosts
    }

    pub fn compound_suffixes(&self) -> &HashSet<String> {
        &self.compound_suffixes
    }
}

/// Builder for [`ParsingConfig`]. Consumed by `build()`.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    section_header_regex: Option<String>,
    section_end_regex: Option<String>,
    fallback_fraction: Option<f64>,
    ieee_segment_regex: Option<String>,
    numbered_segment_regex: Option<String>,
    fallback_segment_regex: Option<String>,
    min_title_words: Option<usize>,
    max_authors: Option<usize>,
    min_reference_chars: Option<usize>,
    compound_suffixes: ListOverride,
    academic_url_hosts: ListOverride,
    venue_cutoffs: ListOverride,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_header_regex(mut self, pattern: &str) -> Self {
        self.section_header_regex = Some(pattern.to_string());
        self
    }

    pub fn section_end_regex(mut self, pattern: &str) -> Self {
        self.section_end_regex = Some(pattern.to_string());
        self
    }

    pub fn fallback_fraction(mut self, fraction: f64) -> Self {
        self.fallback_fraction = Some(fraction);
        self
    }

    pub fn ieee_segment_regex(mut self, pattern: &str) -> Self {
        self.ieee_segment_regex = Some(pattern.to_string());
        self
    }

    pub fn numbered_segment_regex(mut self, pattern: &str) -> Self {
        self.numbered_segment_regex = Some(pattern.to_string());
        self
    }

    pub fn fallback_segment_regex(mut self, pattern: &str) -> Self {
        self.fallback_segment_regex = Some(pattern.to_string());
        self
    }

    pub fn min_title_words(mut self, n: usize) -> Self {
        self.min_title_words = Some(n);
        self
    }

    pub fn max_authors(mut self, n: usize) -> Self {
        self.max_authors = Some(n);
        self
    }

    pub fn min_reference_chars(mut self, n: usize) -> Self {
        self.min_reference_chars = Some(n);
        self
    }

    pub fn compound_suffixes(mut self, list: ListOverride) -> Self {
        self.compound_suffixes = list;
        self
    }

    pub fn academic_url_hosts(mut self, list: ListOverride) -> Self {
        self.academic_url_hosts = list;
        self
    }

    pub fn venue_cutoffs(mut self, list: ListOverride) -> Self {
        self.venue_cutoffs = list;
        self
    }

    pub fn build(self) -> Result<ParsingConfig, ConfigError> {
        let compile = |p: &Option<String>| -> Result<Option<Regex>, ConfigError> {
            p.as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(ConfigError::from)
        };

        let venue_patterns = self.venue_cutoffs.resolve(DEFAULT_VENUE_CUTOFFS);
        let venue_cutoff_res = venue_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParsingConfig {
            section_header_re: compile(&self.section_header_regex)?,
            section_end_re: compile(&self.section_end_regex)?,
            fallback_fraction: self.fallback_fraction.unwrap_or_else(default_fallback_fraction),
            ieee_segment_re: compile(&self.ieee_segment_regex)?,
            numbered_segment_re: compile(&self.numbered_segment_regex)?,
            fallback_segment_re: compile(&self.fallback_segment_regex)?,
            min_title_words: self.min_title_words.unwrap_or_else(default_min_title_words),
            max_authors: self.max_authors.unwrap_or_else(default_max_authors),
            min_reference_chars: self
                .min_reference_chars
                .unwrap_or_else(default_min_reference_chars),
            compound_suffixes: self
                .compound_suffixes
                .resolve(DEFAULT_COMPOUND_SUFFIXES)
                .into_iter()
                .collect(),
            academic_url_hosts: self.academic_url_hosts.resolve(DEFAULT_ACADEMIC_HOSTS),
            venue_cutoff_res,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = ParsingConfig::default();
        assert_eq!(config.min_title_words, 3);
        assert_eq!(config.max_authors, 20);
        assert!(config.compound_suffixes.contains("based"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let result = ParsingConfigBuilder::new()
            .section_header_regex("(unclosed")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn replace_mode_drops_defaults() {
        let list = ListOverride {
            mode: ListOverrideMode::Replace,
            values: vec!["custom".to_string()],
        };
        let resolved = list.resolve(DEFAULT_COMPOUND_SUFFIXES);
        assert_eq!(resolved, vec!["custom".to_string()]);
    }

    #[test]
    fn extend_mode_keeps_defaults() {
        let list = ListOverride {
            mode: ListOverrideMode::Extend,
            values: vec!["custom".to_string()],
        };
        let resolved = list.resolve(&["a", "b"]);
        assert_eq!(resolved, vec!["a", "b", "custom"]);
    }

    #[test]
    fn from_toml_overlays_only_named_fields() {
        let raw = ParsingConfigToml {
            min_title_words: Some(5),
            ..Default::default()
        };
        let config = ParsingConfig::from_toml(&raw).unwrap();
        assert_eq!(config.min_title_words, 5);
        assert_eq!(config.max_authors, 20);
    }
}
