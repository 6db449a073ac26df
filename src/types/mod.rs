//! Public types for the Itinera API.

mod generate;
mod image;

pub use generate::{Generation, GenerationConfig, Itinerary};
pub use image::{ImageQuery, ImageRecord, Orientation, SearchOutcome};
