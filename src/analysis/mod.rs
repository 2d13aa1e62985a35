pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::extract::PaperContent;
use crate::page::PageContext;
use crate::prompt;
use crate::settings::Settings;

/// Papers with less full text than this are not worth sending.
pub const MIN_FULL_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Relevant,
    Irrelevant,
    HighlyRelevant,
    /// Any other label, kept as the model wrote it.
    Unrecognized(String),
}

impl Verdict {
    pub fn label(&self) -> &str {
        match self {
            Self::Relevant => "RELEVANT",
            Self::Irrelevant => "IRRELEVANT",
            Self::HighlyRelevant => "HIGHLY RELEVANT",
            Self::Unrecognized(label) => label,
        }
    }
}

impl From<String> for Verdict {
    fn from(label: String) -> Self {
        match label.as_str() {
            "RELEVANT" => Self::Relevant,
            "IRRELEVANT" => Self::Irrelevant,
            "HIGHLY RELEVANT" => Self::HighlyRelevant,
            _ => Self::Unrecognized(label),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(String::deserialize(deserializer)?.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriterionAssessment {
    #[serde(deserialize_with = "lenient")]
    pub criterion: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub met: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub explanation: Option<String>,
}

/// The model's structured answer. Every field is optional: a response that
/// parses but leaves fields out, or fills them with the wrong type, is still
/// a response, and the presenter renders what is there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    #[serde(default, deserialize_with = "lenient")]
    pub verdict: Option<Verdict>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<i64>,
    #[serde(default, deserialize_with = "lenient_assessments")]
    pub criteria_assessment: Option<Vec<CriterionAssessment>>,
    #[serde(default, deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

/// A value of the wrong type is treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Accept `true`/`false` and their common spellings as strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Accept `85`, `85.0` and `"85%"`; anything else is treated as absent.
fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    })
}

/// Non-array values become `None`; array items that aren't objects are dropped.
fn lenient_assessments<'de, D>(deserializer: D) -> Result<Option<Vec<CriterionAssessment>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

/// Why a single model attempt failed. Recovered by moving to the next model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Failed to parse analysis results: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelFailure {
    pub model: String,
    pub reason: String,
}

/// Errors surfaced to the user. Per-model failures only show up folded
/// into `Exhausted`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API key not configured. Set GEMINI_API_KEY or save one with save_settings.")]
    MissingApiKey,
    #[error("Unable to extract sufficient paper content from this page ({length} characters)")]
    InsufficientContent { length: usize },
    #[error("An analysis is already running. Try again when it finishes.")]
    Busy,
    #[error("All Gemini models failed to provide a valid response ({} tried)", .failures.len())]
    Exhausted { failures: Vec<ModelFailure> },
}

/// A remote text-generation API that can serve several models.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;
    /// Send `prompt` to `model` and return the first candidate's text.
    async fn generate(&self, model: &str, api_key: &str, prompt: &str) -> Result<String, ModelError>;
}

/// Remove a surrounding ```` ```json ```` or ```` ``` ```` fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = body.strip_suffix("```").unwrap_or(body);
    body.strip_suffix('\n').unwrap_or(body)
}

/// Strict parse of a model's JSON answer. Must be a JSON object.
pub fn parse_verdict(json_text: &str) -> Result<AnalysisVerdict, ModelError> {
    let value: Value = serde_json::from_str(json_text)?;
    if !value.is_object() {
        return Err(ModelError::InvalidResponse("expected a JSON object".to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

async fn attempt(
    backend: &dyn GenerativeModel,
    model: &str,
    api_key: &str,
    prompt: &str,
) -> Result<AnalysisVerdict, ModelError> {
    let text = backend.generate(model, api_key, prompt).await?;
    let json_text = strip_code_fence(&text);
    parse_verdict(json_text).inspect_err(|_| {
        tracing::debug!("Unparseable response from {}: {}", model, json_text);
    })
}

/// Try each model in order until one returns a parseable verdict.
pub async fn analyze(
    backend: &dyn GenerativeModel,
    prompt: &str,
    api_key: Option<&str>,
    models: &[String],
) -> Result<AnalysisVerdict, AnalysisError> {
    let api_key = api_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AnalysisError::MissingApiKey)?;

    let mut failures = Vec::new();
    for model in models {
        tracing::info!("Trying {} model: {}", backend.name(), model);
        match attempt(backend, model, api_key, prompt).await {
            Ok(verdict) => {
                tracing::info!("Model {} returned a verdict", model);
                return Ok(verdict);
            }
            Err(e) => {
                tracing::warn!("{} model {} failed: {}", backend.name(), model, e);
                failures.push(ModelFailure {
                    model: model.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Err(AnalysisError::Exhausted { failures })
}

/// Runs one analysis at a time: content check, prompt, model fallback.
pub struct Analyzer {
    backend: Arc<dyn GenerativeModel>,
    models: Vec<String>,
    // Held for the duration of an analysis; a second request is turned away.
    in_flight: Mutex<()>,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn GenerativeModel>, models: Vec<String>) -> Self {
        Self {
            backend,
            models,
            in_flight: Mutex::new(()),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub async fn analyze_paper(
        &self,
        context: &PageContext,
        content: &PaperContent,
        settings: &Settings,
    ) -> Result<AnalysisVerdict, AnalysisError> {
        let Ok(_running) = self.in_flight.try_lock() else {
            return Err(AnalysisError::Busy);
        };
        let length = content.full_text_len();
        if length < MIN_FULL_TEXT_CHARS {
            return Err(AnalysisError::InsufficientContent { length });
        }
        let prompt = prompt::build(content, context.doi.as_ref(), &settings.criteria);
        tracing::debug!(
            "Analyzing {} ({} prompt chars, {} models)",
            context.url,
            prompt.chars().count(),
            self.models.len()
        );
        analyze(self.backend.as_ref(), &prompt, settings.api_key.as_deref(), &self.models).await
    }
}
