//! Engine settings for filipa
//!
//! Stored in filipa.toml. These say where the store lives; the application's
//! own configuration (theme, language, import mappings) is a record inside
//! the store, see [`crate::app_config`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "filipa";
const SETTINGS_FILE: &str = "filipa.toml";

/// filipa engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parent directory of the store (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Store directory name under `data_dir`
    pub store_name: String,

    /// JSON file with the app configuration shipped alongside the program,
    /// used when the store has no saved configuration yet
    pub bundled_config: Option<PathBuf>,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_name: "FilipaDB".to_string(),
            bundled_config: None,
            log_filter: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, defaults if it does not exist
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| crate::Error::Other(format!("Invalid settings: {}", e)))?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Other(format!("Failed to serialize settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where the settings file lives unless overridden
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Directory of the store these settings point at
    pub fn store_dir(&self) -> crate::Result<PathBuf> {
        let base = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| crate::Error::Other("No data directory on this platform".into()))?,
        };
        Ok(base.join(&self.store_name))
    }

    /// Generate a default settings file with comments
    pub fn default_with_comments() -> String {
        r#"# filipa settings

# Parent directory of the store (platform data directory if unset)
# data_dir = "/var/lib/filipa"

# Store directory name under data_dir
store_name = "FilipaDB"

# App configuration JSON used until a configuration is saved in the store
# bundled_config = "config.json"

# Log filter used when RUST_LOG is not set (error, warn, info, debug, trace)
log_filter = "warn"
"#
        .to_string()
    }
}
