//! Run command - rename every invoice PDF in a folder.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::debug;

use invren_core::models::config::validate_dir_name;
use invren_core::{FileStatus, InvrenConfig, OverlayConfig, PipelineSettings, RunSummary};

use crate::shell::{self, RunRequest};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Folder containing the PDF invoices
    #[arg(required = true)]
    source_dir: PathBuf,

    /// PDF stamped over every page of each invoice
    #[arg(long, requires = "last_page")]
    overlay: Option<PathBuf>,

    /// PDF whose first page is appended to each invoice
    #[arg(long, requires = "overlay")]
    last_page: Option<PathBuf>,

    /// Ignore overlay files set in the configuration
    #[arg(long, conflicts_with = "overlay")]
    no_overlay: bool,

    /// Name of the output subfolder
    #[arg(short, long)]
    output_name: Option<String>,

    /// Keep directory listing order instead of sorting by name
    #[arg(long)]
    no_sort: bool,

    /// Also write summary.csv into the output folder
    #[arg(long)]
    summary: bool,

    /// Print the run summary as JSON instead of the log
    #[arg(long)]
    json: bool,
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let overlay = if args.no_overlay {
        None
    } else {
        OverlayConfig::from_parts(args.overlay.clone(), args.last_page.clone())
            .or_else(|| config.overlay.to_config())
    };
    if let Some(ref overlay) = overlay {
        check_overlay_files(overlay)?;
    }

    let settings = settings_for(&config, &args)?;
    debug!(
        "Output folder name: {}",
        settings.output_dir_name(overlay.is_some())
    );

    let summary = shell::execute(RunRequest {
        source_dir: args.source_dir.clone(),
        overlay,
        settings,
        quiet: args.json,
    })
    .await?;

    if args.summary && !summary.is_empty() {
        let summary_path = summary.output_dir.join("summary.csv");
        write_summary(&summary_path, &summary)?;
        if !args.json {
            println!(
                "{} Summary written to {}",
                style("✓").green(),
                summary_path.display()
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !summary.is_empty() {
        shell::print_summary(&summary);
    }

    Ok(())
}

/// Pipeline settings from the config with command-line overrides applied.
fn settings_for(config: &InvrenConfig, args: &RunArgs) -> anyhow::Result<PipelineSettings> {
    let mut settings = PipelineSettings::from_config(config);
    if let Some(ref name) = args.output_name {
        validate_dir_name(name).map_err(|e| anyhow::anyhow!("Invalid output name: {}", e))?;
        settings = settings.with_output_dir_name(name.as_str());
    }
    if args.no_sort {
        settings = settings.with_sorting(false);
    }
    Ok(settings)
}

/// Both overlay inputs must exist before the run starts.
pub fn check_overlay_files(overlay: &OverlayConfig) -> anyhow::Result<()> {
    for path in [&overlay.overlay_path, &overlay.last_page_path] {
        if !path.is_file() {
            anyhow::bail!("Overlay file not found: {}", path.display());
        }
    }
    Ok(())
}

const REPLACED_NOTE: &str = "replaced an earlier file with the same name";

fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "new_name",
        "missing_fields",
        "overlay",
        "error",
    ])?;

    for outcome in &summary.outcomes {
        let filename = outcome.file_name();
        let overlay = shell::overlay_label(&outcome.overlay);

        match &outcome.status {
            FileStatus::Renamed { name, replaced } => {
                let note = if *replaced { REPLACED_NOTE } else { "" };
                wtr.write_record([filename.as_str(), "renamed", name.as_str(), "", overlay, note])?;
            }
            FileStatus::Unmatched { missing } => {
                let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
                let missing = labels.join(";");
                wtr.write_record([filename.as_str(), "unmatched", "", missing.as_str(), overlay, ""])?;
            }
            FileStatus::Failed { error } => {
                wtr.write_record([filename.as_str(), "error", "", "", overlay, error.as_str()])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use invren_core::{Field, FileOutcome, OverlayStatus};

    fn summary(dir: &Path) -> RunSummary {
        let now = chrono::Utc::now();
        RunSummary {
            output_dir: dir.to_path_buf(),
            successful: 2,
            failed: 2,
            outcomes: vec![
                FileOutcome {
                    source: PathBuf::from("in/a.pdf"),
                    output: Some(dir.join("123_456_SMITH.pdf")),
                    status: FileStatus::Renamed {
                        name: "123_456_SMITH.pdf".to_string(),
                        replaced: false,
                    },
                    overlay: OverlayStatus::Applied,
                },
                FileOutcome {
                    source: PathBuf::from("in/d.pdf"),
                    output: Some(dir.join("123_456_SMITH.pdf")),
                    status: FileStatus::Renamed {
                        name: "123_456_SMITH.pdf".to_string(),
                        replaced: true,
                    },
                    overlay: OverlayStatus::Skipped,
                },
                FileOutcome {
                    source: PathBuf::from("in/b.pdf"),
                    output: Some(dir.join("b.pdf")),
                    status: FileStatus::Unmatched {
                        missing: vec![Field::Invoice, Field::LastName],
                    },
                    overlay: OverlayStatus::Skipped,
                },
                FileOutcome {
                    source: PathBuf::from("in/c.pdf"),
                    output: None,
                    status: FileStatus::Failed {
                        error: "bad, file".to_string(),
                    },
                    overlay: OverlayStatus::Skipped,
                },
            ],
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_write_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        write_summary(&path, &summary(dir.path())).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "filename,status,new_name,missing_fields,overlay,error");
        assert_eq!(lines[1], "a.pdf,renamed,123_456_SMITH.pdf,,applied,");
        assert_eq!(
            lines[2],
            "d.pdf,renamed,123_456_SMITH.pdf,,skipped,replaced an earlier file with the same name"
        );
        assert_eq!(lines[3], "b.pdf,unmatched,,INVOICE NO;FOR,skipped,");
        assert_eq!(lines[4], "c.pdf,error,,,skipped,\"bad, file\"");
    }

    #[test]
    fn test_check_overlay_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = OverlayConfig::new(dir.path().join("o.pdf"), dir.path().join("l.pdf"));
        let err = check_overlay_files(&overlay).unwrap_err();
        assert!(err.to_string().contains("o.pdf"));
    }
}
