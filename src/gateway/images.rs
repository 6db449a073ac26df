//! Governed image search.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::query::{first_significant_word, normalize_query};
use crate::ItineraError;
use crate::cache::{CacheConfig, ResponseCache};
use crate::providers::ImageProvider;
use crate::quota::{QuotaTracker, UsageSnapshot};
use crate::telemetry;
use crate::types::{ImageQuery, ImageRecord, Orientation, SearchOutcome};

/// Default number of images per search.
pub const DEFAULT_IMAGE_LIMIT: usize = 6;

/// Largest number of images a single search may request.
pub const MAX_IMAGE_LIMIT: usize = 50;

/// Image search behind a quota tracker and a response cache.
///
/// [`search`](Self::search) never fails: quota exhaustion and upstream
/// failures both yield an empty list. [`search_outcome`](Self::search_outcome)
/// exposes why.
pub struct ImageSearchClient {
    provider: Arc<dyn ImageProvider>,
    tracker: Arc<QuotaTracker>,
    cache: ResponseCache<Vec<ImageRecord>>,
    cache_ttl: Duration,
    default_limit: usize,
}

impl ImageSearchClient {
    /// Create a client. The cache shares the tracker's clock.
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        tracker: Arc<QuotaTracker>,
        cache_config: &CacheConfig,
    ) -> Self {
        let cache = ResponseCache::new("image_search", cache_config)
            .with_clock(Arc::clone(tracker.clock()));
        Self {
            provider,
            tracker,
            cache,
            cache_ttl: cache_config.ttl,
            default_limit: DEFAULT_IMAGE_LIMIT,
        }
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.clamp(1, MAX_IMAGE_LIMIT);
        self
    }

    pub fn tracker(&self) -> &Arc<QuotaTracker> {
        &self.tracker
    }

    /// Search for images; empty on any failure.
    ///
    /// A `limit` of 0 means the default limit.
    pub async fn search(&self, term: &str, limit: usize, orientation: Orientation) -> Vec<ImageRecord> {
        self.search_outcome(term, limit, orientation)
            .await
            .into_images()
    }

    /// Search and report why the result looks the way it does.
    #[instrument(skip(self), fields(operation = "image_search"))]
    pub async fn search_outcome(
        &self,
        term: &str,
        limit: usize,
        orientation: Orientation,
    ) -> SearchOutcome {
        let start = Instant::now();
        let limit = if limit == 0 {
            self.default_limit
        } else {
            limit.min(MAX_IMAGE_LIMIT)
        };

        let normalized = normalize_query(term);
        if normalized.is_empty() {
            debug!("blank image query, skipping upstream");
            return SearchOutcome::Empty;
        }

        let mut outcome = self.lookup(&normalized, limit, orientation).await;
        if matches!(outcome, SearchOutcome::Empty) {
            if let Some(word) = first_significant_word(&normalized) {
                debug!(query = %normalized, retry = word, "no images, retrying with shorter query");
                outcome = self.lookup(word, limit, orientation).await;
            }
        }

        match &outcome {
            SearchOutcome::Found(images) => {
                info!(query = %normalized, count = images.len(), "image search complete")
            }
            SearchOutcome::Empty => info!(query = %normalized, "image search found nothing"),
            SearchOutcome::QuotaExceeded(e) => {
                warn!(query = %normalized, error = %e, "image search skipped")
            }
            SearchOutcome::Failed(e) => warn!(query = %normalized, error = %e, "image search failed"),
        }
        Self::record_request(&outcome, start);
        outcome
    }

    /// Current image budget usage.
    pub async fn budget_status(&self) -> UsageSnapshot {
        self.tracker.usage().await
    }

    /// One cached, deduplicated, quota-checked upstream search.
    async fn lookup(&self, term: &str, limit: usize, orientation: Orientation) -> SearchOutcome {
        let query = ImageQuery::new(term, limit, orientation);
        let key = query.cache_key();
        let provider = Arc::clone(&self.provider);
        let tracker = Arc::clone(&self.tracker);

        let result = self
            .cache
            .get_or_fetch(&key, self.cache_ttl, move || async move {
                tracker.acquire().await?;
                provider.search(&query).await
            })
            .await;

        match result {
            Ok(images) if images.is_empty() => SearchOutcome::Empty,
            Ok(images) => SearchOutcome::Found(images),
            Err(e @ ItineraError::QuotaExceeded { .. }) => SearchOutcome::QuotaExceeded(e),
            Err(e) => SearchOutcome::Failed(e),
        }
    }

    fn record_request(outcome: &SearchOutcome, start: Instant) {
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => "image_search",
            "status" => outcome.reason(),
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "operation" => "image_search",
        )
        .record(start.elapsed().as_secs_f64());
    }
}
