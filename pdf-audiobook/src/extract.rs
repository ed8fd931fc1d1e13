//! Raw text extraction from document bytes.

use crate::error::PipelineError;
use log::debug;
use std::panic::AssertUnwindSafe;

/// Turns document bytes into raw, unnormalized text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, PipelineError>;
}

/// PDF extraction via the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(PipelineError::Extraction("input is not a PDF file".to_string()));
        }

        // pdf-extract panics on some malformed documents.
        let extracted = std::panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
            .map_err(|_| PipelineError::Extraction("PDF parser crashed on this document".to_string()))?
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;

        debug!("Extracted {} characters from {} byte PDF", extracted.len(), bytes.len());
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf() {
        let err = PdfExtractor.extract_text(b"hello world").unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[test]
    fn test_truncated_pdf_is_extraction_error() {
        let err = PdfExtractor.extract_text(b"%PDF-1.4\n%garbage").unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }
}
