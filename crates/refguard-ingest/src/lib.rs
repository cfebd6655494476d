use std::path::Path;

use thiserror::Error;

pub mod archive;

// Re-export domain types for convenience
pub use refguard_core::{ExtractionResult, Reference, SkipStats};
// Re-export archive API
pub use archive::{ArchiveItem, ExtractedPdf, extract_archive_streaming, is_archive_path};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] refguard_parsing::ParsingError),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of refguard-ingest)")]
    NoPdfSupport,
}

/// Extract references from a PDF file (requires the `pdf` feature / mupdf).
pub fn extract_references(path: &Path) -> Result<ExtractionResult, IngestError> {
    extract_pdf(path)
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<ExtractionResult, IngestError> {
    let backend = refguard_pdf_mupdf::MupdfBackend::default();
    refguard_parsing::extract_references(path, &backend).map_err(IngestError::Pdf)
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_path: &Path) -> Result<ExtractionResult, IngestError> {
    Err(IngestError::NoPdfSupport)
}
