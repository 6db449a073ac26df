//! Provider traits for the two metered upstream capabilities.
//!
//! Providers implement one capability trait each rather than a single
//! "god trait". This enables:
//! - Decorator patterns: [`RetryingTextGenerator`](super::RetryingTextGenerator)
//! - Fallback chains: [`FallbackChain`](super::FallbackChain) tries models in order
//! - Fake backends in tests
//!
//! # Error contract
//!
//! Providers translate upstream failures into structured
//! [`ItineraError`](crate::ItineraError) kinds at the adapter boundary.
//! Callers rely on [`is_transient()`](crate::ItineraError::is_transient) to
//! decide whether to advance to the next backend, so a provider must never
//! report a credential problem as a transport error.

use async_trait::async_trait;

use crate::Result;
use crate::types::{GenerationConfig, ImageQuery, ImageRecord};

/// Text completion backend that serves several models.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate text for `prompt` with `model`.
    ///
    /// Returns [`EmptyResponse`](crate::ItineraError::EmptyResponse) when
    /// the upstream answered but produced no text.
    async fn generate(&self, prompt: &str, model: &str, config: &GenerationConfig)
    -> Result<String>;
}

/// Stock-image search backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Search for images. Records without a usable URL are dropped.
    async fn search(&self, query: &ImageQuery) -> Result<Vec<ImageRecord>>;
}
