//! Core library for invoice PDF renaming.
//!
//! This crate provides:
//! - Field extraction (sales person, invoice number, customer last name)
//! - First-page text reading via lopdf and pdf-extract
//! - Overlay stamping with a trailing appendix page
//! - The sequential batch pipeline producing a run summary

pub mod error;
pub mod extract;
pub mod models;
pub mod overlay;
pub mod pdf;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{FileError, InvrenError, OverlayError, PdfError, PipelineError, Result};
pub use extract::{ExtractionResult, Field, FilenameExtractor, InvoiceFields, extract};
pub use models::config::InvrenConfig;
pub use models::summary::{FileOutcome, FileStatus, OverlayStatus, RunSummary};
pub use overlay::{OverlayCompositor, OverlayConfig, apply_overlay};
pub use pdf::{PageTextReader, PdfTextReader};
pub use pipeline::{BatchPipeline, PipelineEvent, PipelineSettings};
