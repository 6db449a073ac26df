//! Keyed response cache with request coalescing.
//!
//! # Architecture
//!
//! ```text
//! get_or_fetch(key)
//!     │
//!     ├─ fresh entry? ──────────────► return cached value
//!     │
//!     ├─ pending fetch for key? ────► await the shared future
//!     │
//!     └─ start fetch, register pending
//!            │
//!            ▼
//!        fetch completes ─► success: store entry
//!                         ─► always: remove pending entry
//! ```
//!
//! The fetch runs on its own tokio task, so it completes and clears its
//! pending entry even when every caller has been dropped. Callers await a
//! [`Shared`] handle to that task and each receives a clone of the same
//! `Result`.
//!
//! Freshness is judged against the injected [`Clock`], not moka's internal
//! clock. moka bounds the entry count and evicts each entry once the TTL
//! it was stored with has passed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use moka::Expiry;

use crate::{ItineraError, Result};
use crate::clock::{Clock, SystemClock};
use crate::telemetry;

/// Configuration for a response cache.
///
/// ```rust
/// # use itinera::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// TTL used by callers that don't pick their own. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A cached value, when it was stored and for how long.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is still fresh at `now` (age ≤ `ttl`).
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.stored_at).to_std() {
            Ok(age) => age <= ttl,
            // stored_at in the future (clock moved back): treat as fresh
            Err(_) => true,
        }
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Evicts each entry after the TTL it was stored with.
struct PerEntryTtl;

impl<V> Expiry<String, CacheEntry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Removes a key from the pending map when dropped, including on panic.
struct PendingGuard<V> {
    key: String,
    pending: Arc<Mutex<HashMap<String, SharedFetch<V>>>>,
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Short-TTL cache that collapses concurrent identical requests.
pub struct ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    operation: &'static str,
    entries: moka::sync::Cache<String, CacheEntry<V>>,
    pending: Arc<Mutex<HashMap<String, SharedFetch<V>>>>,
    clock: Arc<dyn Clock>,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache. `operation` labels its metrics.
    pub fn new(operation: &'static str, config: &CacheConfig) -> Self {
        let entries = moka::sync::Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            operation,
            entries,
            pending: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a custom clock for freshness checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return a fresh cached value, or join/start a fetch for `key`.
    ///
    /// Successful results are cached for `ttl`; failures are not, so the
    /// next call retries immediately. Must be called within a tokio runtime.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key, ttl) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => self.operation)
                .increment(1);
            return Ok(value);
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => self.operation)
            .increment(1);
        self.join_or_start(key, Some(ttl), fetch).await
    }

    /// Deduplicate concurrent fetches for `key` without caching the result.
    pub async fn coalesce<F, Fut>(&self, key: &str, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.join_or_start(key, None, fetch).await
    }

    /// Look up a fresh entry without fetching.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(self.clock.now(), ttl) {
            Some(entry.value)
        } else {
            None
        }
    }

    /// Number of fetches currently in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Evict all cached entries. In-flight fetches are unaffected.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    fn join_or_start<F, Fut>(&self, key: &str, cache_ttl: Option<Duration>, fetch: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = pending.get(key) {
            metrics::counter!(telemetry::COALESCED_TOTAL, "operation" => self.operation)
                .increment(1);
            return existing.clone();
        }

        // A fetch may have completed between the caller's cache miss and
        // taking the lock.
        if let Some(ttl) = cache_ttl {
            if let Some(value) = self.get(key, ttl) {
                return futures_util::future::ready(Ok(value)).boxed().shared();
            }
        }

        let fut = fetch();
        let guard = PendingGuard {
            key: key.to_string(),
            pending: Arc::clone(&self.pending),
        };
        let entries = self.entries.clone();
        let clock = Arc::clone(&self.clock);

        // The guard's removal blocks on `pending` until this function
        // returns, so the entry is always inserted before it is removed.
        let task = tokio::spawn(async move {
            let result = fut.await;
            if let (Some(ttl), Ok(value)) = (cache_ttl, &result) {
                entries.insert(
                    guard.key.clone(),
                    CacheEntry {
                        value: value.clone(),
                        stored_at: clock.now(),
                        ttl,
                    },
                );
            }
            drop(guard);
            result
        });

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(ItineraError::Upstream(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), shared.clone());
        shared
    }
}
