//! Governed clients and the gateway that bundles them

mod builder;
mod embedded;
pub mod images;
pub mod itinerary;
pub mod query;

pub use builder::{
    DEFAULT_MODELS, IMAGES_API, Itinera, ItineraBuilder, LLM_API, default_image_quota,
    default_llm_quota,
};
pub use embedded::Gateway;
pub use images::{DEFAULT_IMAGE_LIMIT, ImageSearchClient, MAX_IMAGE_LIMIT};
pub use itinerary::{ItineraryClient, extract_json};
pub use query::{first_significant_word, normalize_query};
