//! Types for itinerary text generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sampling options forwarded to the LLM backend.
///
/// Serialized in the upstream's camelCase shape so it can be sent as-is;
/// snake_case keys are accepted when reading config files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature (0.0 to 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-k sampling: only consider the k most likely tokens.
    #[serde(default, alias = "top_k", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Nucleus sampling threshold.
    #[serde(default, alias = "top_p", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum number of tokens to generate.
    #[serde(default, alias = "max_output_tokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Requested response MIME type, e.g. `application/json`.
    #[serde(
        default,
        alias = "response_mime_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_mime_type: Option<String>,
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn response_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.response_mime_type = Some(mime.into());
        self
    }
}

/// Text produced by one successful backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Model that produced the text.
    pub model: String,
    /// Backend attempts made, including the successful one.
    pub attempts: usize,
    pub timestamp: DateTime<Utc>,
}

/// A parsed itinerary, or a locally synthesized stand-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub content: serde_json::Value,
    /// Model that produced the content; `None` for placeholders.
    pub model: Option<String>,
    /// `true` when no backend produced usable output.
    pub placeholder: bool,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_wire_shape() {
        let config = GenerationConfig::new()
            .temperature(0.9)
            .top_k(40)
            .max_output_tokens(8192)
            .response_mime_type("application/json");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["topK"], 40);
        assert_eq!(json["maxOutputTokens"], 8192);
        assert_eq!(json["responseMimeType"], "application/json");
        assert!(json.get("topP").is_none());
    }

    #[test]
    fn empty_config_serializes_empty() {
        let json = serde_json::to_string(&GenerationConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
