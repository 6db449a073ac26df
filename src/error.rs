//! Itinera error types

use std::time::Duration;

use crate::quota::QuotaScope;

/// Itinera error types.
///
/// Errors are `Clone` so that a single upstream failure can be handed to
/// every caller joined on the same in-flight request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ItineraError {
    // Local budget errors
    #[error(
        "{api} {scope} quota exceeded ({limit} requests per {scope}); wait for the next {scope} before retrying"
    )]
    QuotaExceeded {
        api: String,
        scope: QuotaScope,
        limit: u32,
        retry_after: Duration,
    },

    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Upstream signalled quota exhaustion or rate limiting.
    #[error("upstream rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from upstream")]
    EmptyResponse,

    /// Upstream failure with no transient signal.
    #[error("upstream error: {0}")]
    Upstream(String),

    // Credential errors (fatal, never retried)
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential suspended: {0}")]
    CredentialSuspended(String),

    // Data errors
    #[error("unexpected upstream response shape: {0}")]
    UpstreamShape(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Persistence errors
    #[error("counter persistence failed: {0}")]
    Persistence(String),

    /// A conditional counter write lost to a concurrent writer.
    #[error("{api} counters changed concurrently (expected revision {expected})")]
    CounterConflict { api: String, expected: u64 },

    // Fallback outcome
    #[error("all {attempts} backends failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ItineraError>,
    },

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for ItineraError {
    fn from(err: serde_json::Error) -> Self {
        ItineraError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for ItineraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ItineraError::Timeout(Duration::ZERO)
        } else {
            ItineraError::Http(err.to_string())
        }
    }
}

impl ItineraError {
    /// Whether the error is transient, i.e. the same request may succeed
    /// against another backend or after a delay.
    pub fn is_transient(&self) -> bool {
        match self {
            ItineraError::RateLimited { .. }
            | ItineraError::Http(_)
            | ItineraError::Timeout(_)
            | ItineraError::EmptyResponse
            | ItineraError::CounterConflict { .. } => true,
            ItineraError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the error is a credential problem that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ItineraError::InvalidCredential(_) | ItineraError::CredentialSuspended(_)
        )
    }

    /// Suggested wait before retrying, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ItineraError::RateLimited { retry_after } => *retry_after,
            ItineraError::QuotaExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Classify a bare upstream error message.
    ///
    /// Only used when the upstream gives no structured status to go on.
    pub fn from_upstream_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("api key not valid") || lower.contains("invalid api key") {
            ItineraError::InvalidCredential(message)
        } else if lower.contains("suspended") || lower.contains("revoked") {
            ItineraError::CredentialSuspended(message)
        } else if lower.contains("quota")
            || lower.contains("resource_exhausted")
            || lower.contains("rate limit")
            || lower.contains("429")
        {
            ItineraError::RateLimited { retry_after: None }
        } else if lower.contains("overloaded")
            || lower.contains("unavailable")
            || lower.contains("503")
        {
            ItineraError::Api {
                status: 503,
                message,
            }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ItineraError::Timeout(Duration::ZERO)
        } else {
            ItineraError::Upstream(message)
        }
    }
}

/// Result type alias for Itinera operations
pub type Result<T> = std::result::Result<T, ItineraError>;
