//! Telemetry metric name constants.
//!
//! Centralised metric names for itinera operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `itinera_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `api`: metered API name (e.g. "llm", "images")
//! - `model`: backend model name tried by the fallback chain
//! - `operation`: cache or request operation (e.g. "generate", "image_search")
//! - `status`: outcome: "ok" or "error"; image searches report
//!   "found", "empty", "quota_exceeded" or "failed"
//! - `scope`: quota scope: "minute", "day" or "month"

/// Total logical requests handled by a governed client.
///
/// Labels: `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "itinera_requests_total";

/// Logical request duration in seconds.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "itinera_request_duration_seconds";

/// Total backend attempts made by the fallback chain.
///
/// Labels: `model`, `status` ("ok" | "error").
pub const FALLBACK_ATTEMPTS_TOTAL: &str = "itinera_fallback_attempts_total";

/// Total retry attempts within one backend (not counting the first).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "itinera_retries_total";

/// Total calls rejected by a quota tracker.
///
/// Labels: `api`, `scope`.
pub const QUOTA_REJECTIONS_TOTAL: &str = "itinera_quota_rejections_total";

/// Total calls permitted by a quota tracker.
///
/// Labels: `api`.
pub const QUOTA_GRANTS_TOTAL: &str = "itinera_quota_grants_total";

/// Total failed counter loads or saves.
///
/// Labels: `api`, `store`.
pub const PERSISTENCE_ERRORS_TOTAL: &str = "itinera_persistence_errors_total";

/// Total response cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "itinera_cache_hits_total";

/// Total response cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "itinera_cache_misses_total";

/// Total callers that joined an already in-flight request.
///
/// Labels: `operation`.
pub const COALESCED_TOTAL: &str = "itinera_coalesced_total";
