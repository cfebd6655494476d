//! Top-level orchestration: document text → section → segments →
//! references.
//!
//! [`ReferenceExtractor`] is the single entry point the rest of the
//! workspace calls into; everything else in this crate is a collaborator
//! it drives.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use refguard_core::{BackendError, ExtractionResult, PdfBackend, Reference, SkipStats};

use crate::ParsingError;
use crate::authors::extract_authors;
use crate::config::ParsingConfig;
use crate::identifiers::{extract_arxiv_id, extract_doi, is_academic_url, is_url_only};
use crate::section::{find_references_section_with_config, segment_references_with_config};
use crate::text_processing::normalize_text;
use crate::title::extract_title;

const MIN_CUSTOM_SEGMENTS: usize = 3;

/// A user-supplied segmentation strategy.
///
/// Given already-located reference-section text, return `Some(segments)`
/// if the strategy recognizes the format, or `None` to abstain. A result
/// with fewer than 3 segments is also treated as an abstain.
pub type CustomSegmentationStrategy = Arc<dyn Fn(&str) -> Option<Vec<String>> + Send + Sync>;

/// Runs the full text-normalization → section-location → segmentation →
/// entry-parsing pipeline over a document.
#[derive(Clone)]
pub struct ReferenceExtractor {
    config: ParsingConfig,
    custom_strategies: Vec<CustomSegmentationStrategy>,
}

impl fmt::Debug for ReferenceExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceExtractor")
            .field("config", &self.config)
            .field("custom_strategies", &self.custom_strategies.len())
            .finish()
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self {
            config: ParsingConfig::default(),
            custom_strategies: Vec::new(),
        }
    }

    pub fn with_config(config: ParsingConfig) -> Self {
        Self {
            config,
            custom_strategies: Vec::new(),
        }
    }

    /// Register a custom segmentation strategy. Strategies run, in
    /// registration order, before the built-in ones, so a collaborator
    /// can recognize a house style the built-ins don't cover.
    pub fn with_custom_strategy(
        mut self,
        strategy: impl Fn(&str) -> Option<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        self.custom_strategies.push(Arc::new(strategy));
        self
    }

    /// Locate the references section within already-extracted document text.
    pub fn find_section(&self, text: &str) -> Option<String> {
        find_references_section_with_config(text, &self.config)
    }

    /// Split a references section into individual reference strings.
    ///
    /// Tries registered custom strategies first, in order, then falls
    /// back to the built-in ones.
    pub fn segment(&self, section_text: &str) -> Vec<String> {
        for strategy in &self.custom_strategies {
            if let Some(segments) = strategy(section_text) {
                if segments.len() >= MIN_CUSTOM_SEGMENTS {
                    return segments;
                }
            }
        }
        segment_references_with_config(section_text, &self.config)
    }

    /// Parse a single raw reference string into a [`Reference`].
    ///
    /// `previous_authors` supplies the author list for the em-dash
    /// "same authors as above" convention.
    pub fn parse_reference(
        &self,
        raw: &str,
        number: usize,
        previous_authors: Option<&[String]>,
    ) -> Reference {
        let doi = extract_doi(raw);
        let arxiv_id = extract_arxiv_id(raw);
        let title = extract_title(raw, &self.config).map(|(t, _)| t);
        let authors = extract_authors(raw, previous_authors, &self.config);

        Reference {
            raw_citation: raw.to_string(),
            title,
            authors,
            doi,
            arxiv_id,
            original_number: number,
            skip_reason: None,
        }
    }

    /// Run the full pipeline over already-extracted document text.
    pub fn extract_from_text(&self, text: &str) -> Result<ExtractionResult, ParsingError> {
        let normalized = normalize_text(text, &self.config);
        let section = self
            .find_section(&normalized)
            .ok_or(ParsingError::NoReferencesSection)?;
        let segments = self.segment(&section);

        let mut stats = SkipStats {
            total_raw: segments.len(),
            ..Default::default()
        };
        let mut references = Vec::new();
        let mut previous_authors: Option<Vec<String>> = None;

        for (i, raw) in segments.iter().enumerate() {
            let number = i + 1;

            if is_url_only(raw) && !is_academic_url(raw, self.config.academic_url_hosts()) {
                stats.url_only += 1;
                continue;
            }

            let reference = self.parse_reference(raw, number, previous_authors.as_deref());

            let Some(title) = &reference.title else {
                stats.no_title += 1;
                continue;
            };

            if title.split_whitespace().count() < self.config.min_title_words {
                stats.short_title += 1;
                continue;
            }

            if reference.authors.is_empty() {
                stats.no_authors += 1;
            }

            previous_authors = Some(reference.authors.clone());
            references.push(reference);
        }

        Ok(ExtractionResult {
            references,
            skip_stats: stats,
        })
    }

    /// Run the full pipeline over a PDF file, delegating text extraction
    /// to `backend`.
    pub fn extract_references_via_backend(
        &self,
        pdf_path: &Path,
        backend: &dyn PdfBackend,
    ) -> Result<ExtractionResult, ParsingError> {
        let text = backend
            .extract_text(pdf_path)
            .map_err(BackendError::from)?;
        self.extract_from_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text() -> &'static str {
        concat!(
            "Introduction text goes here.\n\n",
            "References\n\n",
            "[1] J. Smith and A. Doe. 2020. A Study of Widgets. In Proceedings of CCS. 1-10.\n",
            "[2] B. Clark. 2019. \"Another Great Paper,\" In Proc. USENIX Security. 100-120.\n",
            "[3] https://example.com/not-a-paper\n",
        )
    }

    #[test]
    fn extracts_references_end_to_end() {
        let extractor = ReferenceExtractor::new();
        let result = extractor.extract_from_text(sample_text()).unwrap();
        assert_eq!(result.skip_stats.total_raw, 3);
        assert_eq!(result.skip_stats.url_only, 1);
        assert_eq!(result.references.len(), 2);
        assert!(result.references[0].title.as_deref().unwrap().contains("Widgets"));
    }

    #[test]
    fn missing_references_section_errors() {
        let extractor = ReferenceExtractor::new();
        let result = extractor.extract_from_text("Just a regular document with no bibliography.");
        assert!(matches!(result, Err(ParsingError::NoReferencesSection)));
    }

    #[test]
    fn custom_strategy_runs_before_built_ins() {
        let extractor = ReferenceExtractor::new().with_custom_strategy(|text| {
            Some(text.split("@@@").map(|s| s.trim().to_string()).collect())
        });
        let text = "First ref long enough.@@@Second ref long enough.@@@Third ref long enough.";
        let segments = extractor.segment(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], "First ref long enough.");
    }

    #[test]
    fn custom_strategy_abstain_falls_through_to_built_ins() {
        let extractor =
            ReferenceExtractor::new().with_custom_strategy(|_text| None::<Vec<String>>);
        let text = "\n[1] First reference here.\n[2] Second reference here.\n[3] Third one.\n";
        let segments = extractor.segment(text);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn parse_reference_extracts_doi() {
        let extractor = ReferenceExtractor::new();
        let r = extractor.parse_reference(
            "J. Smith. 2020. A Study of Widgets. https://doi.org/10.1145/3372297.3417247",
            1,
            None,
        );
        assert_eq!(r.doi.as_deref(), Some("10.1145/3372297.3417247"));
    }

    #[test]
    fn em_dash_continuation_inherits_authors() {
        let extractor = ReferenceExtractor::new();
        let text = concat!(
            "Introduction.\n\n",
            "References\n\n",
            "[1] J. Smith. 2020. A Study of Widgets. In Proceedings of CCS. 1-10.\n",
            "[2] ———. 2021. A Follow-up Study of Widgets. In Proceedings of CCS. 11-20.\n",
        );
        let result = extractor.extract_from_text(text).unwrap();
        assert_eq!(result.references.len(), 2);
        assert_eq!(result.references[1].authors, result.references[0].authors);
    }
}
