//! `load_config`: the optional `lesson-docs.yaml` settings file.
//!
//! The file lives in the working directory root. Every key is optional and
//! falls back to its default; command-line flags override whatever the file
//! says. A missing file means defaults; a malformed file or a zero
//! `fetch_timeout_secs` is an error.
//!
//! ```yaml
//! font: Helvetica
//! skip_media: false
//! fetch_timeout_secs: 10
//! sort: name        # or ctime
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lesson_docs_core::docx::DEFAULT_FONT;
use lesson_docs_core::fetch::DEFAULT_FETCH_TIMEOUT;
use lesson_docs_core::merge::SortOrder;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub const CONFIG_FILE_NAME: &str = "lesson-docs.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub font: String,
    pub skip_media: bool,
    pub fetch_timeout_secs: u64,
    pub sort: SortOrder,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font: DEFAULT_FONT.to_string(),
            skip_media: false,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            sort: SortOrder::Name,
        }
    }
}

impl Settings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Parses the settings file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        return Ok(Settings::default());
    }

    match serde_yaml::from_str::<Settings>(&config_content) {
        Ok(settings) if settings.fetch_timeout_secs == 0 => {
            error!(config_path = ?path_ref, "fetch_timeout_secs is zero");
            Err(anyhow::anyhow!(
                "Invalid config: fetch_timeout_secs must be at least 1"
            ))
        }
        Ok(settings) => {
            info!(config_path = ?path_ref, ?settings, "Parsed config YAML successfully");
            Ok(settings)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Settings for the working directory at `root`, or the defaults when it has
/// no settings file.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        debug!(config_path = ?path, "No settings file, using defaults");
        return Ok(Settings::default());
    }
    load_config(path)
}

/// Writes a settings file with every default spelled out, unless one exists.
pub fn write_default_config(root: &Path) -> Result<PathBuf> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() {
        debug!(config_path = ?path, "Settings file already present");
        return Ok(path);
    }
    let yaml = serde_yaml::to_string(&Settings::default())
        .context("Failed to serialise default settings")?;
    fs::write(&path, yaml)
        .with_context(|| format!("Failed to write settings file {}", path.display()))?;
    info!(config_path = ?path, "Wrote default settings file");
    Ok(path)
}
