//! PDF reading module.

mod reader;

pub use reader::PdfTextReader;

use std::path::Path;

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Source of first-page text for the pipeline.
pub trait PageTextReader {
    /// Read the text of the first page of the PDF at `path`.
    fn first_page_text(&self, path: &Path) -> Result<String>;
}

impl<T: PageTextReader + ?Sized> PageTextReader for &T {
    fn first_page_text(&self, path: &Path) -> Result<String> {
        (**self).first_page_text(path)
    }
}
