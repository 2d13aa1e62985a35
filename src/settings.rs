use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SETTINGS_FILE: &str = "settings.json";

/// Gemini API keys all start with this.
pub const API_KEY_PREFIX: &str = "AIza";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Please enter an API key")]
    MissingApiKey,
    #[error("API key should start with \"AIza\"")]
    InvalidApiKey,
    #[error("Could not read PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("{0}")]
    Criteria(String),
}

/// User settings, stored under the same keys the browser extension used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub criteria: String,
}

pub fn validate_api_key(key: &str) -> Result<(), SettingsError> {
    if key.is_empty() {
        return Err(SettingsError::MissingApiKey);
    }
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(SettingsError::InvalidApiKey);
    }
    Ok(())
}

/// JSON file holding the API key and criteria.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved settings. A missing file means nothing was saved yet.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, api_key: &str, criteria: &str) -> Result<Settings, SettingsError> {
        let api_key = api_key.trim();
        validate_api_key(api_key)?;

        let settings = Settings {
            api_key: Some(api_key.to_string()),
            criteria: criteria.trim().to_string(),
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&settings)?)?;
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(settings)
    }
}
