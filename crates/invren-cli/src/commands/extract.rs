//! Extract command - show the fields found in a single PDF.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use serde_json::json;
use tracing::info;

use invren_core::{ExtractionResult, FilenameExtractor, PdfTextReader};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also print the first-page text the fields were read from
    #[arg(long)]
    show_text: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text summary
    Text,
    /// JSON output
    Json,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    if !args.input.is_file() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Reading first page of {}", args.input.display());
    let data = fs::read(&args.input)?;
    let text = PdfTextReader::new().first_page_text_from_mem(&data)?;

    let extractor =
        FilenameExtractor::new().with_agent_prefix_len(config.extraction.agent_prefix_len);
    let result = extractor.extract(&text);
    let derived = match &result {
        ExtractionResult::Complete(fields) => Some(fields.derived_name(extractor.agent_prefix_len())),
        ExtractionResult::Incomplete { .. } => None,
    };

    match args.format {
        OutputFormat::Json => {
            let mut value = json!({
                "file": args.input,
                "result": result,
                "new_name": derived,
            });
            if args.show_text {
                value["text"] = json!(text);
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            if args.show_text {
                println!("{}", style("First page text:").bold());
                println!("{}", text.trim_end());
                println!();
            }
            print_result(&result, derived.as_deref());
        }
    }

    Ok(())
}

fn print_result(result: &ExtractionResult, derived: Option<&str>) {
    match result {
        ExtractionResult::Complete(fields) => {
            println!("Sales person: {}", fields.agent);
            println!("Invoice no.:  {}", fields.invoice);
            println!("Last name:    {}", fields.last_name);
            if let Some(name) = derived {
                println!();
                println!("{} New name: {}", style("✓").green(), style(name).bold());
            }
        }
        ExtractionResult::Incomplete { missing } => {
            println!("{} Could not extract required fields", style("✗").red());
            for field in missing {
                println!("    - Missing {}", field.label());
            }
        }
    }
}
