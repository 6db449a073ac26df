//! Upstream provider adapters and the fallback orchestrator.

pub mod fallback;
pub mod freepik;
pub mod gemini;
pub mod retry;
pub mod traits;

pub use fallback::{DEFAULT_ATTEMPT_TIMEOUT, FallbackChain, FallbackOutcome};
pub use freepik::FreepikClient;
pub use gemini::GeminiClient;
pub use retry::{RetryConfig, RetryingTextGenerator};
pub use traits::{ImageProvider, TextGenerator};
