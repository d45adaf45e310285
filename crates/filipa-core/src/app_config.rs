//! Application configuration record and its loading service
//!
//! The configuration lives in the store as a single record. [`ConfigService`]
//! resolves it on first use: the saved record, else the bundled JSON file,
//! else [`AppConfig::default`]. When nothing was saved, whichever source wins
//! is saved so later loads hit the store. A saved record that no longer
//! decodes is kept as it is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::repo::ConfigRepo;
use crate::{Database, Error, Result};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub theme: ThemeConfig,
    /// Language code, e.g. "en" or "cs"
    pub default_language: String,
    /// Question set files to load on startup
    #[serde(default)]
    pub default_question_sets: Vec<String>,
    /// Import formats by name ("markdown", "json", ...)
    #[serde(default)]
    pub import_mappings: BTreeMap<String, ImportMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    #[serde(default)]
    pub dark_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Markdown,
    Json,
}

/// How the external importer recognises one file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub format: ImportFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    /// Field name to extraction regex, e.g. `"tags" => "^Tags:\\s*(.*)$"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structure: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub question_header: String,
    pub subsection_level: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#0066cc".to_string(),
            secondary_color: "#5c9fd6".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#333333".to_string(),
            dark_mode: false,
        }
    }
}

const MARKDOWN_RULES: &[(&str, &str)] = &[
    ("candidateSection", r"^##\s+Candidate Information$"),
    ("sessionSection", r"^##\s+Session Information$"),
    ("questionsSection", r"^##\s+Questions$"),
    ("questionHeader", r"^##\s+Question\s+(\d+)"),
    ("questionText", r"^###\s+Question$"),
    ("expectedAnswer", r"^###\s+Expected Answer$"),
    ("candidateAnswer", r"^###\s+Candidate's Answer$"),
    ("interviewerNotes", r"^###\s+Interviewer's Notes$"),
    ("candidateName", r"^Candidate:\s*(.*)$"),
    ("candidateId", r"^Candidate ID:\s*(.*)$"),
    ("sessionName", r"^Session:\s*(.*)$"),
    ("sessionDate", r"^Date:\s*(.*)$"),
    ("sessionInterviewers", r"^Interviewers:\s*(.*)$"),
    ("questionId", r"^Question ID:\s*(.*)$"),
    ("tags", r"^Tags:\s*(.*)$"),
    ("difficulty", r"^Difficulty:\s*\[([^\]]+)\]"),
    ("questionType", r"^Type:\s*(.*)$"),
    ("presented", r"^Presented:\s*(.*)$"),
    ("answerRating", r"^Answer Rating:\s*(\d+)"),
];

impl Default for AppConfig {
    fn default() -> Self {
        let markdown = ImportMapping {
            name: Some("Unified Markdown Format".to_string()),
            format: ImportFormat::Markdown,
            description: Some(
                "Simple, unified markdown format for questions and sessions".to_string(),
            ),
            detection: None,
            structure: MARKDOWN_RULES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let json = ImportMapping {
            name: Some("JSON Format".to_string()),
            format: ImportFormat::Json,
            description: Some("Simple JSON export format".to_string()),
            detection: None,
            structure: BTreeMap::new(),
        };

        Self {
            theme: ThemeConfig::default(),
            default_language: "en".to_string(),
            default_question_sets: Vec::new(),
            import_mappings: BTreeMap::from([
                ("markdown".to_string(), markdown),
                ("json".to_string(), json),
            ]),
        }
    }
}

impl AppConfig {
    /// Read a configuration from a JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Cached access to the application configuration
pub struct ConfigService {
    repo: ConfigRepo,
    bundled: Option<PathBuf>,
    cached: Mutex<Option<AppConfig>>,
}

impl ConfigService {
    pub fn new(db: &Database, bundled: Option<PathBuf>) -> Self {
        Self {
            repo: db.config(),
            bundled,
            cached: Mutex::new(None),
        }
    }

    /// The current configuration, resolving and persisting it on first use
    ///
    /// Failures of the saved and bundled tiers are logged and fall through;
    /// this always produces a configuration.
    pub async fn load(&self) -> AppConfig {
        let mut cached = self.cached.lock().await;
        self.current(&mut cached).await
    }

    async fn current(&self, cached: &mut Option<AppConfig>) -> AppConfig {
        if let Some(config) = cached.as_ref() {
            return config.clone();
        }

        let config = self.resolve().await;
        *cached = Some(config.clone());
        config
    }

    async fn resolve(&self) -> AppConfig {
        // a saved record that cannot be read is left alone, never replaced
        let persist = match self.repo.read().await {
            Ok(Some(config)) => return config,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read saved config, using fallback");
                false
            }
        };

        if let Some(path) = &self.bundled {
            match AppConfig::from_file(path).await {
                Ok(config) => {
                    if persist {
                        self.persist(&config).await;
                    }
                    return config;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load bundled config"
                    )
                }
            }
        }

        let config = AppConfig::default();
        if persist {
            self.persist(&config).await;
        }
        config
    }

    async fn persist(&self, config: &AppConfig) {
        if let Err(e) = self.repo.save(config).await {
            tracing::warn!(error = %e, "failed to save config");
        }
    }

    /// Save and cache a new configuration
    pub async fn save(&self, config: AppConfig) -> Result<()> {
        let mut cached = self.cached.lock().await;
        self.store(&mut cached, config).await
    }

    async fn store(&self, cached: &mut Option<AppConfig>, config: AppConfig) -> Result<()> {
        self.repo.save(&config).await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to save config");
        })?;
        *cached = Some(config);
        Ok(())
    }

    /// Change part of the configuration
    ///
    /// The cache stays locked from read to save, so concurrent updates apply
    /// one after the other.
    pub async fn update<F>(&self, apply: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut cached = self.cached.lock().await;
        let mut config = self.current(&mut cached).await;
        apply(&mut config);
        self.store(&mut cached, config.clone()).await?;
        Ok(config)
    }

    /// Replace the configuration with the defaults
    pub async fn reset(&self) -> Result<AppConfig> {
        let config = AppConfig::default();
        self.save(config.clone()).await?;
        Ok(config)
    }

    /// Forget the cached configuration so the next load reads the store
    pub async fn clear_cache(&self) {
        self.cached.lock().await.take();
    }

    /// Look up one import mapping by name
    pub async fn import_mapping(&self, name: &str) -> Result<ImportMapping> {
        self.load()
            .await
            .import_mappings
            .remove(name)
            .ok_or_else(|| Error::Other(format!("No import mapping named {name}")))
    }
}
