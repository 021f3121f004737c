//! Runs the pipeline on a worker thread and renders its events.

use std::path::{Path, PathBuf};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task;

use invren_core::{
    BatchPipeline, FileOutcome, FileStatus, OverlayConfig, OverlayStatus, PdfTextReader,
    PipelineEvent, PipelineSettings, RunSummary,
};

/// Everything one run needs.
pub struct RunRequest {
    pub source_dir: PathBuf,
    pub overlay: Option<OverlayConfig>,
    pub settings: PipelineSettings,
    /// Suppress per-file log lines and the progress bar.
    pub quiet: bool,
}

/// Run the pipeline on a blocking worker, printing events as they arrive.
///
/// The returned error is a run-level failure; per-file problems are in the
/// summary.
pub async fn execute(request: RunRequest) -> anyhow::Result<RunSummary> {
    let RunRequest {
        source_dir,
        overlay,
        settings,
        quiet,
    } = request;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = task::spawn_blocking(move || {
        let pipeline = BatchPipeline::new(settings, PdfTextReader::new());
        pipeline.run(&source_dir, overlay.as_ref(), |event| {
            // The receiver only goes away if the shell itself is gone.
            let _ = tx.send(event);
        })
    });

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        progress_bar()?
    };

    while let Some(event) = rx.recv().await {
        if !quiet {
            render(&pb, event);
        }
    }

    let result = worker.await?;
    pb.finish_and_clear();
    Ok(result?)
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Print one event above the progress bar.
fn render(pb: &ProgressBar, event: PipelineEvent) {
    let say = |line: String| pb.suspend(|| println!("{}", line));

    match event {
        PipelineEvent::OutputDirCreated(path) => {
            say(format!("Created directory: {}", path.display()));
        }
        PipelineEvent::FilesFound { count, overlay } => {
            pb.set_length(count as u64);
            say(format!("{} Found {} PDF files", style("ℹ").blue(), count));
            if let Some(overlay) = overlay {
                say(format!(
                    "Overlay mode enabled with: {}",
                    file_label(&overlay.overlay_path)
                ));
            }
        }
        PipelineEvent::NoFilesFound { .. } => {
            say(format!(
                "{}",
                style("No PDF files found in the selected folder!").yellow()
            ));
        }
        PipelineEvent::FileStarted { index, total, name } => {
            say(format!("\n[{}/{}] Processing: {}", index, total, name));
        }
        PipelineEvent::OverlayApplied { .. } => {
            say(format!("  {} Overlay & last page applied", style("✓").green()));
        }
        PipelineEvent::OverlayFailed { error, .. } => {
            say(format!("  {} Overlay error: {}", style("✗").red(), error));
            say(format!(
                "  {} Overlay failed, but continuing with rename...",
                style("✗").red()
            ));
        }
        PipelineEvent::Renamed {
            new_name, replaced, ..
        } => {
            pb.inc(1);
            say(format!("  {} Renamed to: {}", style("✓").green(), new_name));
            if replaced {
                say(format!(
                    "  {} {} was already produced by an earlier file and has been replaced",
                    style("!").yellow(),
                    new_name
                ));
            }
        }
        PipelineEvent::FieldsMissing { missing, .. } => {
            pb.inc(1);
            say(format!(
                "  {} Could not extract required fields",
                style("✗").red()
            ));
            for field in missing {
                say(format!("    - Missing {}", field.label()));
            }
        }
        PipelineEvent::FileFailed { error, .. } => {
            pb.inc(1);
            say(format!("  {} Error: {}", style("✗").red(), error));
        }
    }
}

/// Print the closing summary block.
pub fn print_summary(summary: &RunSummary) {
    let rule = "=".repeat(50);

    println!();
    println!("{}", rule);
    println!("{}", style("SUMMARY").bold());
    println!(
        "Successfully processed: {}",
        style(summary.successful).green()
    );
    println!("Failed: {}", style(summary.failed).red());
    println!("Output folder: {}", summary.output_dir.display());
    println!("{}", rule);

    let replaced: Vec<&FileOutcome> = summary.replaced().collect();
    if !replaced.is_empty() {
        println!();
        println!(
            "{}",
            style("Renamed over an earlier file with the same name:").yellow()
        );
        for outcome in replaced {
            if let FileStatus::Renamed { name, .. } = &outcome.status {
                println!("  - {} -> {}", outcome.file_name(), name);
            }
        }
    }

    if summary.failed > 0 {
        println!();
        println!("{}", style("Files needing attention:").red());
        for outcome in summary.failures() {
            println!("  - {}: {}", outcome.file_name(), failure_reason(outcome));
        }
    }

    let elapsed = summary.elapsed().to_std().unwrap_or_default();
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        summary.total(),
        elapsed
    );
}

/// Short human-readable reason a file was not renamed.
pub fn failure_reason(outcome: &FileOutcome) -> String {
    match &outcome.status {
        FileStatus::Renamed { .. } => String::new(),
        FileStatus::Unmatched { missing } => {
            let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
            format!("missing {}", labels.join(", "))
        }
        FileStatus::Failed { error } => error.clone(),
    }
}

/// `applied`, `skipped` or `failed` for tabular output.
pub fn overlay_label(status: &OverlayStatus) -> &'static str {
    match status {
        OverlayStatus::Skipped => "skipped",
        OverlayStatus::Applied => "applied",
        OverlayStatus::Failed { .. } => "failed",
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use invren_core::Field;

    fn outcome(status: FileStatus) -> FileOutcome {
        FileOutcome {
            source: PathBuf::from("/in/a.pdf"),
            output: None,
            status,
            overlay: OverlayStatus::Skipped,
        }
    }

    #[test]
    fn test_failure_reason_lists_missing_labels() {
        let o = outcome(FileStatus::Unmatched {
            missing: vec![Field::Agent, Field::LastName],
        });
        assert_eq!(failure_reason(&o), "missing SALES PERSON, FOR");
    }

    #[test]
    fn test_failure_reason_passes_error_through() {
        let o = outcome(FileStatus::Failed {
            error: "copy failed".to_string(),
        });
        assert_eq!(failure_reason(&o), "copy failed");
    }

    #[test]
    fn test_overlay_label() {
        assert_eq!(overlay_label(&OverlayStatus::Applied), "applied");
        assert_eq!(
            overlay_label(&OverlayStatus::Failed {
                error: "x".to_string()
            }),
            "failed"
        );
    }
}
