//! Gemini `generateContent` client.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::TextGenerator;
use crate::types::GenerationConfig;
use crate::{ItineraError, Result};

/// Default base URL for the Gemini API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini generative language API.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Generate text for `prompt` with `model`.
    pub async fn generate_content(
        &self,
        prompt: &str,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: config,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            let err = classify_error(status.as_u16(), retry_after, &body);
            debug!(model, status = status.as_u16(), error = %err, "gemini request failed");
            return Err(err);
        }

        let body: GenerateContentResponse = response.json().await?;
        extract_text(body)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        self.generate_content(prompt, model, config).await
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a failed response to an error kind.
///
/// HTTP status and the `error.status` field of the JSON envelope take
/// precedence; the message text is only sniffed when neither decides.
fn classify_error(status: u16, retry_after: Option<Duration>, body: &str) -> ItineraError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let message = envelope
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.trim().to_string());
    let upstream_status = envelope
        .as_ref()
        .and_then(|e| e.status.as_deref())
        .unwrap_or_default();
    let lower = message.to_lowercase();

    if status == 429 || upstream_status == "RESOURCE_EXHAUSTED" {
        ItineraError::RateLimited { retry_after }
    } else if status == 401
        || upstream_status == "UNAUTHENTICATED"
        || lower.contains("api key not valid")
    {
        ItineraError::InvalidCredential(message)
    } else if status == 403 || upstream_status == "PERMISSION_DENIED" || lower.contains("suspended")
    {
        ItineraError::CredentialSuspended(message)
    } else if status >= 500 || upstream_status == "UNAVAILABLE" {
        ItineraError::Api { status, message }
    } else if envelope.is_some() {
        ItineraError::Api { status, message }
    } else {
        ItineraError::from_upstream_message(message)
    }
}

fn extract_text(body: GenerateContentResponse) -> Result<String> {
    let candidates = body.candidates.ok_or_else(|| {
        let reason = body
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        ItineraError::UpstreamShape(format!("gemini response without candidates: {reason}"))
    })?;

    let text: String = candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ItineraError::EmptyResponse);
    }
    Ok(text)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
