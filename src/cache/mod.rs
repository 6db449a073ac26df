//! Response caching and in-flight request deduplication.
//!
//! [`ResponseCache`] combines a short-TTL value cache with a map of pending
//! requests. Callers asking for the same key while a fetch is outstanding
//! join that fetch instead of starting another, so N concurrent identical
//! requests cost one upstream call (and one quota slot).

pub mod response;

pub use response::{CacheConfig, CacheEntry, ResponseCache};
