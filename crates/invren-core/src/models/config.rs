//! Configuration structures for the renaming pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InvrenError, Result};
use crate::extract::DEFAULT_AGENT_PREFIX_LEN;
use crate::overlay::OverlayConfig;

/// Main configuration for invren.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvrenConfig {
    /// Output directory naming.
    pub output: OutputConfig,

    /// Batch processing behaviour.
    pub pipeline: PipelineConfig,

    /// Field extraction settings.
    pub extraction: ExtractionConfig,

    /// Default overlay inputs.
    pub overlay: OverlayDefaults,
}

/// Names of the output subdirectory created under the source folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Used when no overlay is applied.
    pub renamed_dir: String,

    /// Used when an overlay is applied.
    pub processed_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            renamed_dir: "renamed_invoices".to_string(),
            processed_dir: "processed_invoices".to_string(),
        }
    }
}

impl OutputConfig {
    /// Output subdirectory name for a run with or without overlay.
    pub fn dir_name(&self, with_overlay: bool) -> &str {
        if with_overlay {
            &self.processed_dir
        } else {
            &self.renamed_dir
        }
    }
}

/// Batch processing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Process files in file-name order instead of directory listing order.
    pub sort_files: bool,

    /// Carry access/modification times over to the copies.
    pub preserve_timestamps: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sort_files: true,
            preserve_timestamps: true,
        }
    }
}

/// Field extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Leading agent-code characters dropped from the new name (branch code).
    pub agent_prefix_len: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            agent_prefix_len: DEFAULT_AGENT_PREFIX_LEN,
        }
    }
}

/// Overlay inputs used when none are given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayDefaults {
    /// Stamp PDF.
    pub overlay_path: Option<PathBuf>,

    /// Appendix PDF.
    pub last_page_path: Option<PathBuf>,
}

impl OverlayDefaults {
    /// Both paths as an overlay config, if both are set.
    pub fn to_config(&self) -> Option<OverlayConfig> {
        OverlayConfig::from_parts(self.overlay_path.clone(), self.last_page_path.clone())
    }
}

impl InvrenConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| InvrenError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InvrenError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would make a run misbehave.
    pub fn validate(&self) -> Result<()> {
        for (key, name) in [
            ("output.renamed_dir", &self.output.renamed_dir),
            ("output.processed_dir", &self.output.processed_dir),
        ] {
            validate_dir_name(name).map_err(|reason| InvrenError::Config(format!("{}: {}", key, reason)))?;
        }

        if self.overlay.overlay_path.is_some() != self.overlay.last_page_path.is_some() {
            return Err(InvrenError::Config(
                "overlay.overlay_path and overlay.last_page_path must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

/// Check that `name` is a single plain path component.
pub fn validate_dir_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(format!("{:?} must be a plain directory name", name));
    }
    Ok(())
}
