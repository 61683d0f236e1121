//! TOML configuration for the command-line editor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use retouch_pipeline::EditConfig;
use serde::{Deserialize, Serialize};

/// Default tracing filter when neither `RETOUCH_LOG` nor the config file
/// sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and stored images unless they are
    /// placed elsewhere.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// SQLite database file. Defaults to `<workspace>/retouch.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Directory for stored image versions. Defaults to
    /// `<workspace>/images`.
    #[serde(default)]
    pub blobs: Option<PathBuf>,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub edit: EditConfig,
}

fn default_workspace() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("retouch")
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            database: None,
            blobs: None,
            log_filter: default_log_filter(),
            edit: EditConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a
    /// missing file named explicitly is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.workspace.join("retouch.db"))
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.blobs
            .clone()
            .unwrap_or_else(|| self.workspace.join("images"))
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("retouch")
            .join("config.toml")
    }
}
