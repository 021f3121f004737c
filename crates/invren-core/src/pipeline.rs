//! Sequential batch pipeline: copy, stamp, extract, rename.

use std::collections::HashSet;
use std::fs::{self, FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{FileError, PipelineError};
use crate::extract::{ExtractionResult, Field, FilenameExtractor};
use crate::models::config::{InvrenConfig, OutputConfig};
use crate::models::summary::{FileOutcome, FileStatus, OverlayStatus, RunSummary};
use crate::overlay::{OverlayCompositor, OverlayConfig};
use crate::pdf::PageTextReader;

/// Progress messages emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The output directory did not exist and was created.
    OutputDirCreated(PathBuf),
    /// Candidate files were found.
    FilesFound {
        count: usize,
        overlay: Option<OverlayConfig>,
    },
    /// The source directory holds no PDF files; the run ends here.
    NoFilesFound { source_dir: PathBuf },
    /// Processing of one file begins (`index` is 1-based).
    FileStarted {
        index: usize,
        total: usize,
        name: String,
    },
    OverlayApplied { name: String },
    /// Stamping failed; the file is still renamed.
    OverlayFailed { name: String, error: String },
    /// `replaced` is set when an earlier file of this run already produced
    /// `new_name`; that copy has been overwritten.
    Renamed {
        name: String,
        new_name: String,
        replaced: bool,
    },
    /// The copy keeps its original name.
    FieldsMissing { name: String, missing: Vec<Field> },
    /// A file-system or extraction error ended this file.
    FileFailed { name: String, error: String },
}

/// Settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Default output directory names.
    pub output: OutputConfig,
    /// Explicit output directory name, overriding `output`.
    pub output_dir_name: Option<String>,
    pub sort_files: bool,
    pub preserve_timestamps: bool,
    pub agent_prefix_len: usize,
}

impl PipelineSettings {
    /// Settings taken from a loaded configuration.
    pub fn from_config(config: &InvrenConfig) -> Self {
        Self {
            output: config.output.clone(),
            output_dir_name: None,
            sort_files: config.pipeline.sort_files,
            preserve_timestamps: config.pipeline.preserve_timestamps,
            agent_prefix_len: config.extraction.agent_prefix_len,
        }
    }

    /// Force a specific output directory name.
    pub fn with_output_dir_name(mut self, name: impl Into<String>) -> Self {
        self.output_dir_name = Some(name.into());
        self
    }

    /// Set whether files are processed in name order.
    pub fn with_sorting(mut self, sort: bool) -> Self {
        self.sort_files = sort;
        self
    }

    /// Output directory name for a run with or without overlay.
    pub fn output_dir_name(&self, with_overlay: bool) -> &str {
        self.output_dir_name
            .as_deref()
            .unwrap_or_else(|| self.output.dir_name(with_overlay))
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&InvrenConfig::default())
    }
}

/// Renames the PDFs of one directory into an output subdirectory.
pub struct BatchPipeline<R> {
    settings: PipelineSettings,
    reader: R,
    extractor: FilenameExtractor,
}

impl<R: PageTextReader> BatchPipeline<R> {
    /// Create a pipeline reading page text through `reader`.
    pub fn new(settings: PipelineSettings, reader: R) -> Self {
        let extractor = FilenameExtractor::new().with_agent_prefix_len(settings.agent_prefix_len);
        Self {
            settings,
            reader,
            extractor,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process every PDF directly inside `source_dir`.
    ///
    /// Only run-level failures are returned as errors; a failing file is
    /// recorded in the summary and the run moves on to the next one.
    pub fn run<F>(
        &self,
        source_dir: &Path,
        overlay: Option<&OverlayConfig>,
        mut on_event: F,
    ) -> Result<RunSummary, PipelineError>
    where
        F: FnMut(PipelineEvent),
    {
        let started_at = Utc::now();

        if !source_dir.is_dir() {
            return Err(PipelineError::SourceNotDirectory(source_dir.to_path_buf()));
        }

        let output_dir = source_dir.join(self.settings.output_dir_name(overlay.is_some()));
        if !output_dir.is_dir() {
            fs::create_dir_all(&output_dir).map_err(|source| PipelineError::CreateOutputDir {
                path: output_dir.clone(),
                source,
            })?;
            info!("Created directory: {}", output_dir.display());
            on_event(PipelineEvent::OutputDirCreated(output_dir.clone()));
        }

        let files = self.discover(source_dir)?;
        let mut summary = RunSummary::new(output_dir.clone(), started_at);

        if files.is_empty() {
            info!("No PDF files found in {}", source_dir.display());
            on_event(PipelineEvent::NoFilesFound {
                source_dir: source_dir.to_path_buf(),
            });
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let total = files.len();
        info!("Found {} PDF files in {}", total, source_dir.display());
        on_event(PipelineEvent::FilesFound {
            count: total,
            overlay: overlay.cloned(),
        });

        let compositor = overlay.cloned().map(OverlayCompositor::new);
        let mut produced = HashSet::new();
        for (i, source) in files.iter().enumerate() {
            on_event(PipelineEvent::FileStarted {
                index: i + 1,
                total,
                name: display_name(source),
            });
            let outcome =
                self.process_file(source, &output_dir, compositor.as_ref(), &produced, &mut on_event);
            if let Some(ref output) = outcome.output {
                produced.insert(output.clone());
            }
            summary.record(outcome);
        }

        summary.finished_at = Utc::now();
        info!(
            "Run finished: {} successful, {} failed, output in {}",
            summary.successful,
            summary.failed,
            output_dir.display()
        );
        Ok(summary)
    }

    /// Regular files directly inside `source_dir` named `*.pdf` (any case).
    fn discover(&self, source_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let read_err = |source| PipelineError::ReadSourceDir {
            path: source_dir.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(source_dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let is_pdf = entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .ends_with(".pdf");
            let path = entry.path();
            if is_pdf && path.is_file() {
                files.push(path);
            }
        }

        if self.settings.sort_files {
            files.sort();
        }
        debug!("Discovered {} candidate files", files.len());
        Ok(files)
    }

    fn process_file<F>(
        &self,
        source: &Path,
        output_dir: &Path,
        compositor: Option<&OverlayCompositor>,
        produced: &HashSet<PathBuf>,
        on_event: &mut F,
    ) -> FileOutcome
    where
        F: FnMut(PipelineEvent),
    {
        let name = display_name(source);
        let mut outcome = FileOutcome {
            source: source.to_path_buf(),
            output: None,
            status: FileStatus::Failed {
                error: String::new(),
            },
            overlay: OverlayStatus::Skipped,
        };

        outcome.status = match self.try_process(source, output_dir, compositor, produced, &mut outcome, on_event) {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to process {}: {}", name, e);
                on_event(PipelineEvent::FileFailed {
                    name,
                    error: e.to_string(),
                });
                FileStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        outcome
    }

    fn try_process<F>(
        &self,
        source: &Path,
        output_dir: &Path,
        compositor: Option<&OverlayCompositor>,
        produced: &HashSet<PathBuf>,
        outcome: &mut FileOutcome,
        on_event: &mut F,
    ) -> Result<FileStatus, FileError>
    where
        F: FnMut(PipelineEvent),
    {
        let name = display_name(source);
        let file_name = source.file_name().ok_or_else(|| {
            FileError::fs("copy", source, io::Error::new(io::ErrorKind::InvalidInput, "no file name"))
        })?;
        let dest = output_dir.join(file_name);

        self.copy(source, &dest)?;
        outcome.output = Some(dest.clone());

        if let Some(compositor) = compositor {
            match compositor.apply(&dest) {
                Ok(()) => {
                    debug!("Overlay applied to {}", dest.display());
                    outcome.overlay = OverlayStatus::Applied;
                    on_event(PipelineEvent::OverlayApplied { name: name.clone() });
                }
                Err(e) => {
                    warn!("Overlay failed for {}: {}", name, e);
                    outcome.overlay = OverlayStatus::Failed {
                        error: e.to_string(),
                    };
                    on_event(PipelineEvent::OverlayFailed {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Read the original: the stamp would add its own text to the copy.
        let text = self.reader.first_page_text(source)?;

        match self.extractor.extract(&text) {
            ExtractionResult::Complete(fields) => {
                let new_name = fields.derived_name(self.extractor.agent_prefix_len());
                let renamed = output_dir.join(&new_name);
                let replaced = renamed != dest && produced.contains(&renamed);
                if replaced {
                    warn!(
                        "{} derives the same name as an earlier file; replacing {}",
                        name,
                        renamed.display()
                    );
                } else if renamed != dest && renamed.exists() {
                    debug!("Replacing {} from an earlier run", renamed.display());
                }
                fs::rename(&dest, &renamed).map_err(|e| FileError::fs("rename", &dest, e))?;

                info!("Renamed {} to {}", name, new_name);
                outcome.output = Some(renamed);
                on_event(PipelineEvent::Renamed {
                    name,
                    new_name: new_name.clone(),
                    replaced,
                });
                Ok(FileStatus::Renamed {
                    name: new_name,
                    replaced,
                })
            }
            ExtractionResult::Incomplete { missing } => {
                info!("Could not extract required fields from {}: {:?}", name, missing);
                on_event(PipelineEvent::FieldsMissing {
                    name,
                    missing: missing.clone(),
                });
                Ok(FileStatus::Unmatched { missing })
            }
        }
    }

    fn copy(&self, source: &Path, dest: &Path) -> Result<(), FileError> {
        fs::copy(source, dest).map_err(|e| FileError::fs("copy", source, e))?;

        if self.settings.preserve_timestamps {
            let meta = fs::metadata(source).map_err(|e| FileError::fs("stat", source, e))?;
            let mut times = FileTimes::new();
            if let Ok(modified) = meta.modified() {
                times = times.set_modified(modified);
            }
            if let Ok(accessed) = meta.accessed() {
                times = times.set_accessed(accessed);
            }
            OpenOptions::new()
                .write(true)
                .open(dest)
                .and_then(|file| file.set_times(times))
                .map_err(|e| FileError::fs("set times", dest, e))?;
        }
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
