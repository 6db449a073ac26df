//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use super::{Gateway, ImageSearchClient, ItineraryClient};
use crate::cache::CacheConfig;
use crate::clock::{Clock, SystemClock};
use crate::providers::{
    DEFAULT_ATTEMPT_TIMEOUT, FallbackChain, FreepikClient, GeminiClient, ImageProvider,
    RetryConfig, TextGenerator,
};
use crate::quota::{QuotaPolicy, QuotaTracker};
use crate::store::{CounterStore, MemoryStore};
use crate::types::GenerationConfig;
use crate::{ItineraError, Result};

/// Quota tracker name for the LLM API.
pub const LLM_API: &str = "llm";

/// Quota tracker name for the image API.
pub const IMAGES_API: &str = "images";

/// Default model chain, fastest and cheapest first.
pub const DEFAULT_MODELS: &[&str] = &["gemini-2.0-flash-lite", "gemini-2.0-flash", "gemini-1.5-flash"];

/// Default LLM budget (Gemini free tier).
pub fn default_llm_quota() -> QuotaPolicy {
    QuotaPolicy::new()
        .max_per_minute(15)
        .max_per_day(1_500)
        .max_per_month(45_000)
        .min_interval(Duration::from_secs(4))
}

/// Default image budget.
pub fn default_image_quota() -> QuotaPolicy {
    QuotaPolicy::new()
        .max_per_minute(10)
        .max_per_day(100)
        .max_per_month(2_500)
        .min_interval(Duration::from_secs(1))
        .cost_per_call(0.004)
}

/// Main entry point for creating gateway instances.
pub struct Itinera;

impl Itinera {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> ItineraBuilder {
        ItineraBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct ItineraBuilder {
    gemini_key: Option<String>,
    gemini_base_url: Option<String>,
    freepik_key: Option<String>,
    freepik_base_url: Option<String>,
    text_backend: Option<Arc<dyn TextGenerator>>,
    image_backend: Option<Arc<dyn ImageProvider>>,
    models: Vec<String>,
    llm_quota: QuotaPolicy,
    image_quota: QuotaPolicy,
    generation: GenerationConfig,
    retry: Option<RetryConfig>,
    image_cache: CacheConfig,
    default_image_limit: Option<usize>,
    attempt_timeout: Duration,
    store: Option<Arc<dyn CounterStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ItineraBuilder {
    pub fn new() -> Self {
        Self {
            gemini_key: None,
            gemini_base_url: None,
            freepik_key: None,
            freepik_base_url: None,
            text_backend: None,
            image_backend: None,
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            llm_quota: default_llm_quota(),
            image_quota: default_image_quota(),
            generation: GenerationConfig::default(),
            retry: None,
            image_cache: CacheConfig::default(),
            default_image_limit: None,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            store: None,
            clock: None,
        }
    }

    /// Configure the Gemini LLM backend.
    pub fn gemini(mut self, api_key: impl Into<String>) -> Self {
        self.gemini_key = Some(api_key.into());
        self
    }

    /// Override the Gemini base URL (for proxies and tests).
    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.gemini_base_url = Some(url.into());
        self
    }

    /// Configure the Freepik image backend.
    pub fn freepik(mut self, api_key: impl Into<String>) -> Self {
        self.freepik_key = Some(api_key.into());
        self
    }

    /// Override the Freepik base URL (for proxies and tests).
    pub fn freepik_base_url(mut self, url: impl Into<String>) -> Self {
        self.freepik_base_url = Some(url.into());
        self
    }

    /// Use a custom text backend instead of Gemini.
    pub fn text_backend(mut self, backend: Arc<dyn TextGenerator>) -> Self {
        self.text_backend = Some(backend);
        self
    }

    /// Use a custom image backend instead of Freepik.
    pub fn image_backend(mut self, backend: Arc<dyn ImageProvider>) -> Self {
        self.image_backend = Some(backend);
        self
    }

    /// Set the model fallback order.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn llm_quota(mut self, policy: QuotaPolicy) -> Self {
        self.llm_quota = policy;
        self
    }

    pub fn image_quota(mut self, policy: QuotaPolicy) -> Self {
        self.image_quota = policy;
        self
    }

    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    /// Retry each model on transient errors before falling back.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn image_cache(mut self, config: CacheConfig) -> Self {
        self.image_cache = config;
        self
    }

    pub fn default_image_limit(mut self, limit: usize) -> Self {
        self.default_image_limit = Some(limit);
        self
    }

    /// Per-attempt timeout for LLM calls.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Where usage counters are persisted. Default: in memory.
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        let text_backend = self.text_backend.or_else(|| {
            self.gemini_key.map(|key| -> Arc<dyn TextGenerator> {
                match self.gemini_base_url {
                    Some(url) => Arc::new(GeminiClient::with_base_url(key, url)),
                    None => Arc::new(GeminiClient::new(key)),
                }
            })
        });
        let image_backend = self.image_backend.or_else(|| {
            self.freepik_key.map(|key| -> Arc<dyn ImageProvider> {
                match self.freepik_base_url {
                    Some(url) => Arc::new(FreepikClient::with_base_url(key, url)),
                    None => Arc::new(FreepikClient::new(key)),
                }
            })
        });

        if text_backend.is_none() && image_backend.is_none() {
            return Err(ItineraError::NoProvider);
        }
        if text_backend.is_some() && self.models.is_empty() {
            return Err(ItineraError::Configuration(
                "at least one model is required".into(),
            ));
        }

        let store: Arc<dyn CounterStore> =
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let itinerary = text_backend.map(|backend| {
            let tracker = Arc::new(
                QuotaTracker::new(LLM_API, self.llm_quota, Arc::clone(&store))
                    .with_clock(Arc::clone(&clock)),
            );
            let mut chain = FallbackChain::new(backend, self.models)
                .attempt_timeout(self.attempt_timeout)
                .with_clock(Arc::clone(&clock));
            if let Some(retry) = self.retry {
                chain = chain.with_retry(retry);
            }
            ItineraryClient::new(chain, tracker).generation_config(self.generation)
        });

        let images = image_backend.map(|backend| {
            let tracker = Arc::new(
                QuotaTracker::new(IMAGES_API, self.image_quota, Arc::clone(&store))
                    .with_clock(Arc::clone(&clock)),
            );
            let client = ImageSearchClient::new(backend, tracker, &self.image_cache);
            match self.default_image_limit {
                Some(limit) => client.default_limit(limit),
                None => client,
            }
        });

        Ok(Gateway::new(itinerary, images, store))
    }
}

impl Default for ItineraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
