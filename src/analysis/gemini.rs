use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerativeModel, ModelError};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

/// Low temperature keeps verdicts repeatable.
pub const TEMPERATURE: f32 = 0.4;
pub const MAX_OUTPUT_TOKENS: u32 = 10_000;

/// Client for Gemini's `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("paper-triage/0.1")
                .build()?,
            api_url: api_url.into(),
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        })
    }

    fn endpoint(&self, model: &str, api_key: &str) -> String {
        format!("{}{}:generateContent?key={}", self.api_url, model, api_key)
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}
#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}
#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}
#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// `candidates[0].content.parts[0].text`, if the response has one.
fn first_candidate_text(resp: GenerateResponse) -> Option<String> {
    resp.candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.is_empty())
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()?
        .error?
        .message
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, model: &str, api_key: &str, prompt: &str) -> Result<String, ModelError> {
        let resp = self
            .client
            .post(self.endpoint(model, api_key))
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: GenerateResponse = resp.json().await?;
        first_candidate_text(data)
            .ok_or_else(|| ModelError::InvalidResponse("no candidate text in Gemini response".to_string()))
    }
}
