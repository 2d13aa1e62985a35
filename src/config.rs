use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::gemini::{self, GeminiClient};
use crate::analysis::Analyzer;
use crate::settings::{Settings, SettingsError, SettingsStore};

/// Fallback order: the first model is preferred, the last is the final try.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.5-flash-exp",
    "gemini-2.0-flash-001",
    "gemini-2.0-flash-lite-preview-02-05",
    "gemini-flash-lite-latest",
    "gemini-2.5-flash-lite",
];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub models: Vec<String>,
    pub api_key_override: Option<String>,
    pub criteria_override: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("PAPER_TRIAGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_or_default().join(".paper-triage"));

        let api_url = env_non_empty("PAPER_TRIAGE_API_URL")
            .unwrap_or_else(|| gemini::DEFAULT_API_URL.to_string());

        let models = env_non_empty("PAPER_TRIAGE_MODELS")
            .map(|s| parse_models(&s))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(default_models);

        Self {
            data_dir,
            api_url,
            models,
            api_key_override: env_non_empty("GEMINI_API_KEY"),
            criteria_override: env_non_empty("PAPER_TRIAGE_CRITERIA"),
        }
    }

    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::open(&self.data_dir)
    }

    /// Saved settings with environment overrides applied.
    pub fn effective_settings(&self) -> Result<Settings, SettingsError> {
        let mut settings = self.settings_store().load()?;
        if let Some(ref key) = self.api_key_override {
            settings.api_key = Some(key.clone());
        }
        if let Some(ref criteria) = self.criteria_override {
            settings.criteria = criteria.clone();
        }
        Ok(settings)
    }

    /// Build the analyzer backed by Gemini.
    pub fn build_analyzer(&self) -> Result<Analyzer, reqwest::Error> {
        let client = GeminiClient::new(self.api_url.clone())?;
        Ok(Analyzer::new(Arc::new(client), self.models.clone()))
    }

    /// Describe the current configuration without exposing the API key.
    pub fn status(&self) -> Result<ConfigStatus, SettingsError> {
        let stored = self.settings_store().load()?;

        let (api_key, api_key_source) = match (&self.api_key_override, &stored.api_key) {
            (Some(key), _) => (Some(mask_key(key)), "GEMINI_API_KEY"),
            (None, Some(key)) => (Some(mask_key(key)), "settings file"),
            (None, None) => (None, "not configured"),
        };
        let (criteria, criteria_source) = match &self.criteria_override {
            Some(c) => (c.as_str(), "PAPER_TRIAGE_CRITERIA"),
            None if !stored.criteria.is_empty() => (stored.criteria.as_str(), "settings file"),
            None => ("", "not configured"),
        };

        Ok(ConfigStatus {
            settings_file: self.settings_store().path().display().to_string(),
            api_key,
            api_key_source: api_key_source.into(),
            criteria_chars: criteria.chars().count(),
            criteria_source: criteria_source.into(),
            api_url: self.api_url.clone(),
            models: self.models.clone(),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfigStatus {
    pub settings_file: String,
    pub api_key: Option<String>,
    pub api_key_source: String,
    pub criteria_chars: usize,
    pub criteria_source: String,
    pub api_url: String,
    pub models: Vec<String>,
}

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

fn parse_models(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn dirs_or_default() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
