use std::path::Path;

use surety_common::{config::SuretyConfig, Result, SuretyError};
use tracing::info;

/// Writes the default configuration to `path` unless a file is already
/// there and `force` is off. Returns whether a file was written.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        info!(path = %path.display(), "config already present, leaving it");
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SuretyError::Config(e.to_string()))?;
    }
    SuretyConfig::default().save_to_file(path)?;
    info!(path = %path.display(), "default config written");
    Ok(true)
}

/// Loads `path`, generating the default configuration first if missing.
pub fn ensure_config(path: &Path) -> Result<SuretyConfig> {
    init_config(path, false)?;
    SuretyConfig::load_from_file(path)
}
