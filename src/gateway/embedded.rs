//! Gateway - in-process governed clients

use std::sync::Arc;

use super::{ImageSearchClient, ItineraryClient};
use crate::quota::UsageSnapshot;
use crate::store::CounterStore;
use crate::types::{Generation, ImageRecord, Itinerary, Orientation};
use crate::{ItineraError, Result};

/// Governed clients for every configured upstream API.
///
/// Created with [`Itinera::builder()`](super::Itinera::builder).
pub struct Gateway {
    itinerary: Option<ItineraryClient>,
    images: Option<ImageSearchClient>,
    store: Arc<dyn CounterStore>,
}

impl Gateway {
    pub(crate) fn new(
        itinerary: Option<ItineraryClient>,
        images: Option<ImageSearchClient>,
        store: Arc<dyn CounterStore>,
    ) -> Self {
        Self {
            itinerary,
            images,
            store,
        }
    }

    /// The LLM client, if a text backend is configured.
    pub fn itinerary_client(&self) -> Result<&ItineraryClient> {
        self.itinerary.as_ref().ok_or(ItineraError::NoProvider)
    }

    /// The image client, if an image backend is configured.
    pub fn image_client(&self) -> Result<&ImageSearchClient> {
        self.images.as_ref().ok_or(ItineraError::NoProvider)
    }

    /// Store holding every tracker's counters.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// See [`ItineraryClient::generate`].
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<Generation> {
        self.itinerary_client()?.generate(prompt, model).await
    }

    /// See [`ItineraryClient::itinerary`].
    pub async fn itinerary(&self, prompt: &str) -> Result<Itinerary> {
        self.itinerary_client()?.itinerary(prompt).await
    }

    /// See [`ImageSearchClient::search`]. Empty when no image backend is configured.
    pub async fn search_images(
        &self,
        term: &str,
        limit: usize,
        orientation: Orientation,
    ) -> Vec<ImageRecord> {
        match &self.images {
            Some(client) => client.search(term, limit, orientation).await,
            None => Vec::new(),
        }
    }

    /// Usage of every configured tracker.
    pub async fn usage(&self) -> Vec<UsageSnapshot> {
        let mut snapshots = Vec::new();
        if let Some(client) = &self.itinerary {
            snapshots.push(client.usage().await);
        }
        if let Some(client) = &self.images {
            snapshots.push(client.budget_status().await);
        }
        snapshots
    }
}
