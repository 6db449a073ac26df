//! Types for stock-image search.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ItineraError;

/// Requested image orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Square,
    Panoramic,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Square => "square",
            Orientation::Panoramic => "panoramic",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream image search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub term: String,
    pub limit: usize,
    pub orientation: Orientation,
}

impl ImageQuery {
    pub fn new(term: impl Into<String>, limit: usize, orientation: Orientation) -> Self {
        Self {
            term: term.into(),
            limit,
            orientation,
        }
    }

    /// Cache/dedup key: term, limit and orientation.
    pub fn cache_key(&self) -> String {
        format!("{}|{}|{}", self.term, self.limit, self.orientation)
    }
}

/// Provider-independent image record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
    pub thumbnail: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Why an image search produced what it did.
///
/// The outward contract only exposes the image list; this keeps the
/// distinction between "nothing matched" and "upstream failed" for logging.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found(Vec<ImageRecord>),
    Empty,
    QuotaExceeded(ItineraError),
    Failed(ItineraError),
}

impl SearchOutcome {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SearchOutcome::Found(_) => "found",
            SearchOutcome::Empty => "empty",
            SearchOutcome::QuotaExceeded(_) => "quota_exceeded",
            SearchOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_empty(&self) -> bool {
        !matches!(self, SearchOutcome::Found(images) if !images.is_empty())
    }

    /// Images found, or an empty list for every other outcome.
    pub fn into_images(self) -> Vec<ImageRecord> {
        match self {
            SearchOutcome::Found(images) => images,
            _ => Vec::new(),
        }
    }
}
