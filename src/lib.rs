//! Itinera - budget-gated request governor for metered APIs
//!
//! Sits between application code and paid or free-tier upstream APIs (an
//! LLM completion service and a stock-image search service) and makes
//! every call pass through:
//!
//! - a [`QuotaTracker`] enforcing per-minute, per-day and per-month
//!   ceilings plus a minimum spacing between calls, with counters
//!   persisted through a [`CounterStore`];
//! - a [`ResponseCache`] that answers repeated queries locally and
//!   collapses concurrent identical requests into one upstream call;
//! - a [`FallbackChain`] that tries LLM models in order and degrades to a
//!   placeholder when every backend is unavailable.
//!
//! # Example
//!
//! ```rust,no_run
//! use itinera::{Itinera, Orientation};
//!
//! #[tokio::main]
//! async fn main() -> itinera::Result<()> {
//!     let gateway = Itinera::builder()
//!         .gemini("your-gemini-key")
//!         .freepik("your-freepik-key")
//!         .build()?;
//!
//!     let plan = gateway
//!         .itinerary("Three days in Lisbon, JSON with a `days` array")
//!         .await?;
//!     println!("placeholder: {}", plan.placeholder);
//!
//!     let images = gateway
//!         .search_images("Belém Tower", 4, Orientation::Landscape)
//!         .await;
//!     println!("{} images", images.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod quota;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheEntry, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ItineraError, Result};
pub use gateway::{Gateway, ImageSearchClient, Itinera, ItineraBuilder, ItineraryClient};
pub use providers::{
    FallbackChain, FallbackOutcome, FreepikClient, GeminiClient, ImageProvider, RetryConfig,
    RetryingTextGenerator, TextGenerator,
};
pub use quota::{QuotaPolicy, QuotaScope, QuotaTracker, Reservation, UsageCounters, UsageSnapshot};
pub use store::{CounterStore, JsonFileStore, MemoryStore, RemoteStore, UsageDocument};
pub use types::{
    Generation, GenerationConfig, ImageQuery, ImageRecord, Itinerary, Orientation, SearchOutcome,
};
pub use version::{PKG_VERSION, version_string};
