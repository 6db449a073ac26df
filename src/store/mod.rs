//! Durable storage for usage counters.
//!
//! [`CounterStore`] is deliberately narrow (`load`/`save` of one
//! [`UsageCounters`] document per metered API) so that backings are
//! interchangeable:
//!
//! - [`MemoryStore`]: process-local map; counters reset on restart.
//! - [`JsonFileStore`]: one JSON file per API under a directory.
//! - [`RemoteStore`]: HTTP key-value store speaking the `/usage` protocol
//!   served by `itinerad`.
//!
//! The [`QuotaTracker`](crate::quota::QuotaTracker) owns all check-and-
//! increment logic. Stores only compare revisions: the tracker writes with
//! [`CounterStore::save_if`], and a write based on a stale read fails with
//! [`ItineraError::CounterConflict`](crate::ItineraError::CounterConflict)
//! so the tracker can reload and decide again. The comparison is atomic
//! within one store instance; processes sharing counters must all reach
//! the same instance, which is what `itinerad`'s `/usage` endpoint is for.

mod file;
mod memory;
mod remote;

use async_trait::async_trait;

use crate::quota::UsageCounters;
use crate::{ItineraError, Result};

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use remote::{RemoteStore, UsageDocument};

/// Persistence backing for usage counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &str;

    /// Load the counters for `api`, or `None` if nothing was saved yet.
    async fn load(&self, api: &str) -> Result<Option<UsageCounters>>;

    /// Replace the counters for `api` unconditionally.
    async fn save(&self, api: &str, counters: &UsageCounters) -> Result<()>;

    /// Replace the counters for `api` only if the stored revision is still
    /// `expected` (0 when nothing is stored).
    ///
    /// Fails with [`ItineraError::CounterConflict`] when another writer
    /// got there first.
    async fn save_if(&self, api: &str, expected: u64, counters: &UsageCounters) -> Result<()>;
}

/// Compare the stored revision against the one a writer based its change on.
pub(crate) fn check_revision(
    api: &str,
    stored: Option<&UsageCounters>,
    expected: u64,
) -> Result<()> {
    let current = stored.map_or(0, |c| c.revision);
    if current == expected {
        Ok(())
    } else {
        Err(ItineraError::CounterConflict {
            api: api.to_string(),
            expected,
        })
    }
}

/// API names become file names and URL parameters.
pub(crate) fn validate_api_name(api: &str) -> Result<()> {
    let valid = !api.is_empty()
        && api.len() <= 64
        && api
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ItineraError::InvalidInput(format!(
            "invalid api name '{api}'"
        )))
    }
}
