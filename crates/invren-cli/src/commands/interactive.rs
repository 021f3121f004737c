//! Interactive command - prompt for folders and run until the user stops.

use std::path::PathBuf;

use clap::Args;
use console::{Term, style};

use invren_core::{InvrenConfig, OverlayConfig, PipelineSettings};

use crate::shell::{self, RunRequest};

/// Arguments for the interactive command.
#[derive(Args)]
pub struct InteractiveArgs {
    /// Do not ask for overlay files
    #[arg(long)]
    no_overlay: bool,
}

pub async fn run(args: InteractiveArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let term = Term::stdout();

    term.write_line(&format!("{}", style("Invoice renamer").bold()))?;

    loop {
        let Some(source_dir) = ask_path(&term, "Folder containing PDF invoices")? else {
            term.write_line(&format!("{}", style("No folder given.").yellow()))?;
            break;
        };

        let overlay = if args.no_overlay {
            None
        } else {
            ask_overlay(&term, &config)?
        };
        if let Some(ref overlay) = overlay {
            if let Err(e) = super::run::check_overlay_files(overlay) {
                term.write_line(&format!("{} {}", style("✗").red(), e))?;
                continue;
            }
        }

        let request = RunRequest {
            source_dir,
            overlay,
            settings: PipelineSettings::from_config(&config),
            quiet: false,
        };

        match shell::execute(request).await {
            Ok(summary) if !summary.is_empty() => shell::print_summary(&summary),
            Ok(_) => {}
            Err(e) => {
                term.write_line(&format!("{} {}", style("Fatal error:").red().bold(), e))?;
            }
        }

        term.write_line("")?;
        if !confirm(&term, "Process another folder?")? {
            break;
        }
    }

    Ok(())
}

/// Ask for the overlay pair; an empty answer to the first prompt means none.
fn ask_overlay(term: &Term, config: &InvrenConfig) -> anyhow::Result<Option<OverlayConfig>> {
    let defaults = config.overlay.to_config();
    let hint = match defaults {
        Some(ref d) => format!("Overlay PDF (enter for {})", d.overlay_path.display()),
        None => "Overlay PDF (enter to skip)".to_string(),
    };

    let Some(overlay_path) = ask_path(term, &hint)? else {
        return Ok(defaults);
    };

    match ask_path(term, "Last page PDF")? {
        Some(last_page_path) => Ok(Some(OverlayConfig::new(overlay_path, last_page_path))),
        None => {
            term.write_line(&format!(
                "{}",
                style("No last page PDF given, running without overlay.").yellow()
            ))?;
            Ok(None)
        }
    }
}

fn ask_path(term: &Term, prompt: &str) -> anyhow::Result<Option<PathBuf>> {
    term.write_str(&format!("{}: ", prompt))?;
    let line = term.read_line()?;
    Ok(parse_path(&line))
}

fn confirm(term: &Term, prompt: &str) -> anyhow::Result<bool> {
    term.write_str(&format!("{} [y/N] ", prompt))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Clean up a typed or dragged-in path. Strips surrounding quotes and expands
/// a leading `~`.
fn parse_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }
    Some(PathBuf::from(trimmed))
}
