pub mod config;
pub mod extract;
pub mod interactive;
pub mod run;

use std::path::Path;

use invren_core::InvrenConfig;

/// Load the config named on the command line, else the default file if it
/// exists, else built-in defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvrenConfig> {
    if let Some(path) = config_path {
        return Ok(InvrenConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(InvrenConfig::from_file(&default_path)?)
    } else {
        Ok(InvrenConfig::default())
    }
}
