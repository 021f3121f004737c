//! Error types for the invren-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the invren library.
#[derive(Error, Debug)]
pub enum InvrenError {
    /// PDF reading error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Overlay stamping error.
    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// Run-level pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to reading PDF documents.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors raised while stamping an overlay onto a document.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// One of the input documents could not be loaded.
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// A document that must contribute a page has none.
    #[error("{} has no pages", path.display())]
    EmptyDocument { path: PathBuf },

    /// The document structure is not what the compositor expects.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Writing the stamped document failed.
    #[error("failed to save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Swapping the stamped document into place failed.
    #[error("failed to replace {}: {source}", path.display())]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<lopdf::Error> for OverlayError {
    fn from(err: lopdf::Error) -> Self {
        OverlayError::Malformed(err.to_string())
    }
}

/// Errors confined to a single file of a batch.
#[derive(Error, Debug)]
pub enum FileError {
    /// A copy, rename or metadata call failed.
    #[error("{op} failed for {}: {source}", path.display())]
    FileSystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// First-page text could not be read.
    #[error("text extraction failed: {0}")]
    TextExtraction(#[from] PdfError),
}

impl FileError {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FileError::FileSystem {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source path is missing or not a directory.
    #[error("source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    /// The output directory could not be created.
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source directory could not be listed.
    #[error("cannot read source directory {}: {source}", path.display())]
    ReadSourceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for the invren library.
pub type Result<T> = std::result::Result<T, InvrenError>;
