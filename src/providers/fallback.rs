//! Ordered multi-model fallback.
//!
//! A [`FallbackChain`] tries models in a fixed order (fastest/cheapest
//! first) against one [`TextGenerator`] backend until one succeeds or a
//! non-retriable error stops the chain.
//!
//! # Fallback Chain Flow
//!
//! ```text
//! chain.run(prompt)
//!          │
//!          ▼
//!   ┌──────────────┐  transient (429, 5xx, timeout, transport)
//!   │  TRYING(0)   │ ─────────────────────────────┐
//!   └──────┬───────┘                              ▼
//!          │ ok                            ┌──────────────┐
//!          ▼                               │  TRYING(1)   │ ── ... ──► EXHAUSTED
//!      SUCCESS                             └──────────────┘
//!
//!   any non-transient error (credential, bad request) ──► FATAL
//! ```
//!
//! Each attempt is bounded by `attempt_timeout`; a timeout counts as
//! transient.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::retry::{RetryConfig, RetryingTextGenerator};
use super::traits::TextGenerator;
use crate::clock::{Clock, SystemClock};
use crate::telemetry;
use crate::types::{Generation, GenerationConfig};
use crate::{ItineraError, Result};

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal state of one logical request through the chain.
#[derive(Debug, Clone)]
pub enum FallbackOutcome {
    /// A backend produced text.
    Success(Generation),
    /// Every backend failed with a retriable error.
    Exhausted {
        attempts: usize,
        last_error: ItineraError,
    },
    /// A backend failed in a way no other backend can fix.
    Fatal {
        model: String,
        attempts: usize,
        error: ItineraError,
    },
}

impl FallbackOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            FallbackOutcome::Success(generation) => generation.attempts,
            FallbackOutcome::Exhausted { attempts, .. } | FallbackOutcome::Fatal { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Collapse into a `Result`.
    ///
    /// Exhaustion becomes [`ItineraError::Exhausted`]; a fatal error is
    /// returned as-is.
    pub fn into_result(self) -> Result<Generation> {
        match self {
            FallbackOutcome::Success(generation) => Ok(generation),
            FallbackOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(ItineraError::Exhausted {
                attempts,
                last: Box::new(last_error),
            }),
            FallbackOutcome::Fatal { error, .. } => Err(error),
        }
    }
}

/// Ordered list of models served by one backend.
pub struct FallbackChain {
    backend: Arc<dyn TextGenerator>,
    models: Vec<String>,
    attempt_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl FallbackChain {
    /// Create a chain. `models` are tried in the given order.
    pub fn new(backend: Arc<dyn TextGenerator>, models: Vec<String>) -> Self {
        Self {
            backend,
            models,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    /// Retry each model on transient errors before advancing.
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.backend = Arc::new(RetryingTextGenerator::new(self.backend, config));
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run the configured chain.
    pub async fn run(&self, prompt: &str, config: &GenerationConfig) -> FallbackOutcome {
        self.run_with(&self.models, prompt, config).await
    }

    /// Run an explicit model list through the same backend.
    #[instrument(skip(self, prompt, config), fields(backend = %self.backend.name()))]
    pub async fn run_with(
        &self,
        models: &[String],
        prompt: &str,
        config: &GenerationConfig,
    ) -> FallbackOutcome {
        let mut last_error = None;
        for (i, model) in models.iter().enumerate() {
            let attempts = i + 1;
            let start = Instant::now();
            match self.attempt(model, prompt, config).await {
                Ok(text) => {
                    Self::record_attempt(model, start, true);
                    debug!(model = %model, attempt = attempts, "backend succeeded");
                    return FallbackOutcome::Success(Generation {
                        text,
                        model: model.clone(),
                        attempts,
                        timestamp: self.clock.now(),
                    });
                }
                Err(e) if e.is_transient() => {
                    Self::record_attempt(model, start, false);
                    warn!(model = %model, attempt = attempts, error = %e, "backend failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => {
                    Self::record_attempt(model, start, false);
                    warn!(model = %model, attempt = attempts, error = %e, "backend failed fatally");
                    return FallbackOutcome::Fatal {
                        model: model.clone(),
                        attempts,
                        error: e,
                    };
                }
            }
        }
        FallbackOutcome::Exhausted {
            attempts: models.len(),
            last_error: last_error.unwrap_or(ItineraError::NoProvider),
        }
    }

    async fn attempt(&self, model: &str, prompt: &str, config: &GenerationConfig) -> Result<String> {
        match tokio::time::timeout(
            self.attempt_timeout,
            self.backend.generate(prompt, model, config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ItineraError::Timeout(self.attempt_timeout)),
        }
    }

    fn record_attempt(model: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::FALLBACK_ATTEMPTS_TOTAL,
            "model" => model.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "operation" => "fallback_attempt",
        )
        .record(start.elapsed().as_secs_f64());
    }
}
