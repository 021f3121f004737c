//! First-page text extraction using lopdf and pdf-extract.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use lopdf::Document;
use tracing::{debug, trace, warn};

use super::{PageTextReader, Result};
use crate::error::PdfError;

/// Reads page text from PDF files on disk.
#[derive(Debug, Clone, Default)]
pub struct PdfTextReader;

impl PdfTextReader {
    /// Create a new reader.
    pub fn new() -> Self {
        Self
    }

    /// Load a document from bytes, decrypting empty-password PDFs.
    ///
    /// Returns the parsed document together with the bytes pdf-extract should
    /// read, which are re-serialized when decryption was needed.
    fn load(data: &[u8]) -> Result<(Document, Vec<u8>)> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        Ok((doc, raw))
    }

    /// Extract the text of the first page from in-memory PDF bytes.
    pub fn first_page_text_from_mem(&self, data: &[u8]) -> Result<String> {
        let (doc, raw) = Self::load(data)?;

        // pdf-extract panics on some valid fonts (e.g. /StandardEncoding).
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&raw)
        }));
        match extracted {
            Ok(Ok(pages)) => {
                if let Some(first) = pages.into_iter().next() {
                    trace!("pdf-extract returned {} chars for page 1", first.len());
                    return Ok(first);
                }
                debug!("pdf-extract returned no pages, falling back to lopdf");
            }
            Ok(Err(e)) => debug!("pdf-extract failed ({}), falling back to lopdf", e),
            Err(_) => warn!("pdf-extract panicked, falling back to lopdf"),
        }

        panic::catch_unwind(AssertUnwindSafe(|| doc.extract_text(&[1])))
            .map_err(|_| PdfError::TextExtraction("text extractor panicked".to_string()))?
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }
}

impl PageTextReader for PdfTextReader {
    fn first_page_text(&self, path: &Path) -> Result<String> {
        let data = fs::read(path)
            .map_err(|e| PdfError::Parse(format!("{}: {}", path.display(), e)))?;
        self.first_page_text_from_mem(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_reads_first_page_only() {
        let bytes = fixtures::text_pdf(&[
            &["SALES PERSON: AGT123", "INVOICE NO. ITIN000456", "FOR: SMITH/JOHN"],
            &["SECOND PAGE BROWN"],
        ]);

        let text = PdfTextReader::new().first_page_text_from_mem(&bytes).unwrap();
        assert!(text.contains("SMITH"), "got {:?}", text);
        assert!(!text.contains("BROWN"), "got {:?}", text);
    }

    #[test]
    fn test_standard_encoding_font_does_not_panic() {
        let bytes = fixtures::standard_encoding_pdf(&[
            &["SALES PERSON: LON777", "INVOICE NO. ITIN123456", "FOR: JONES/MARY"],
        ]);

        let result = PdfTextReader::new().first_page_text_from_mem(&bytes);
        assert!(
            matches!(result, Ok(_) | Err(PdfError::TextExtraction(_))),
            "got {:?}",
            result
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let result = PdfTextReader::new().first_page_text_from_mem(b"not a pdf");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = PdfTextReader::new().first_page_text(&dir.path().join("nope.pdf"));
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }
}
