//! Governed itinerary generation.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::cache::{CacheConfig, ResponseCache};
use crate::providers::FallbackChain;
use crate::quota::{QuotaTracker, UsageSnapshot};
use crate::telemetry;
use crate::types::{Generation, GenerationConfig, Itinerary};
use crate::{ItineraError, Result};

/// LLM generation behind a quota tracker and a fallback chain.
///
/// Identical prompts in flight at the same time share one upstream call.
/// Results are not cached: generation is not deterministic.
pub struct ItineraryClient {
    chain: Arc<FallbackChain>,
    tracker: Arc<QuotaTracker>,
    generation: GenerationConfig,
    inflight: ResponseCache<Generation>,
}

impl ItineraryClient {
    pub fn new(chain: FallbackChain, tracker: Arc<QuotaTracker>) -> Self {
        let inflight = ResponseCache::new("generate", &CacheConfig::default())
            .with_clock(Arc::clone(tracker.clock()));
        Self {
            chain: Arc::new(chain),
            tracker,
            generation: GenerationConfig::default(),
            inflight,
        }
    }

    /// Sampling options sent with every request.
    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    pub fn tracker(&self) -> &Arc<QuotaTracker> {
        &self.tracker
    }

    pub fn models(&self) -> &[String] {
        self.chain.models()
    }

    /// Generate text for `prompt`.
    ///
    /// With `model` set, only that model is tried; otherwise the configured
    /// chain runs in order. One quota slot is consumed per call regardless
    /// of how many backends are tried.
    #[instrument(skip(self, prompt), fields(operation = "generate", prompt_len = prompt.len()))]
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<Generation> {
        let start = Instant::now();
        if prompt.trim().is_empty() {
            Self::record_request(start, false);
            return Err(ItineraError::InvalidInput("prompt must not be empty".into()));
        }

        let models: Vec<String> = match model {
            Some(m) if !m.trim().is_empty() => vec![m.trim().to_string()],
            _ => self.chain.models().to_vec(),
        };
        let key = format!("{}\n{}", models.join(","), prompt);

        let chain = Arc::clone(&self.chain);
        let tracker = Arc::clone(&self.tracker);
        let config = self.generation.clone();
        let prompt = prompt.to_string();

        let result = self
            .inflight
            .coalesce(&key, move || async move {
                tracker.acquire().await?;
                chain.run_with(&models, &prompt, &config).await.into_result()
            })
            .await;

        match &result {
            Ok(generation) => info!(
                model = %generation.model,
                attempts = generation.attempts,
                "generation complete"
            ),
            Err(e) => warn!(error = %e, "generation failed"),
        }
        Self::record_request(start, result.is_ok());
        result
    }

    /// Generate and parse an itinerary document.
    ///
    /// Quota and credential errors are returned. Every other failure,
    /// including unparseable output, yields a placeholder itinerary.
    pub async fn itinerary(&self, prompt: &str) -> Result<Itinerary> {
        match self.generate(prompt, None).await {
            Ok(generation) => match extract_json(&generation.text) {
                Some(content) => Ok(Itinerary {
                    content,
                    model: Some(generation.model),
                    placeholder: false,
                    generated_at: generation.timestamp,
                }),
                None => {
                    warn!(model = %generation.model, "generated text is not a JSON document, using placeholder");
                    Ok(self.placeholder(prompt, "unparseable"))
                }
            },
            Err(e @ ItineraError::QuotaExceeded { .. }) => Err(e),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "no backend produced an itinerary, using placeholder");
                Ok(self.placeholder(prompt, "unavailable"))
            }
        }
    }

    /// Current LLM budget usage.
    pub async fn usage(&self) -> UsageSnapshot {
        self.tracker.usage().await
    }

    fn placeholder(&self, prompt: &str, reason: &str) -> Itinerary {
        Itinerary {
            content: json!({
                "title": "Your trip",
                "summary": "A detailed itinerary could not be generated right now. Try again shortly.",
                "request": prompt,
                "reason": reason,
                "days": [],
            }),
            model: None,
            placeholder: true,
            generated_at: self.tracker.clock().now(),
        }
    }

    fn record_request(start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => "generate",
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "operation" => "generate",
        )
        .record(start.elapsed().as_secs_f64());
    }
}

/// Pull a JSON object or array out of model output.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded
/// by prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
