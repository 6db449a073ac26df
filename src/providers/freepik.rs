//! Freepik stock-resource search client.
//!
//! See: <https://docs.freepik.com/api-reference/resources/get-all-resources>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::traits::ImageProvider;
use crate::types::{ImageQuery, ImageRecord};
use crate::{ItineraError, Result};

/// Default base URL for the Freepik API.
const DEFAULT_BASE_URL: &str = "https://api.freepik.com";

/// Client for the Freepik resources API.
#[derive(Clone)]
pub struct FreepikClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl FreepikClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn search_resources(&self, query: &ImageQuery) -> Result<Vec<ImageRecord>> {
        let url = format!("{}/v1/resources", self.base_url);
        let params = [
            ("term".to_string(), query.term.clone()),
            ("limit".to_string(), query.limit.to_string()),
            (
                format!("filters[orientation][{}]", query.orientation),
                "1".to_string(),
            ),
        ];

        let response = self
            .http
            .get(&url)
            .header("x-freepik-api-key", &self.api_key)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "freepik request failed");
            return Err(match status.as_u16() {
                429 => ItineraError::RateLimited { retry_after },
                401 => ItineraError::InvalidCredential(message),
                403 => ItineraError::CredentialSuspended(message),
                code => ItineraError::Api {
                    status: code,
                    message: format!("Freepik API error: {status}"),
                },
            });
        }

        let body: Value = response.json().await?;
        let data = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ItineraError::UpstreamShape("freepik response without data array".into()))?;

        let mut images: Vec<ImageRecord> = data.iter().filter_map(map_record).collect();
        images.truncate(query.limit);
        Ok(images)
    }
}

#[async_trait]
impl ImageProvider for FreepikClient {
    fn name(&self) -> &str {
        "freepik"
    }

    async fn search(&self, query: &ImageQuery) -> Result<Vec<ImageRecord>> {
        self.search_resources(query).await
    }
}

/// Map one upstream record, or `None` when it has no usable image URL.
///
/// Records are read field by field: the upstream shape varies by
/// resource type and unknown fields are ignored.
pub(crate) fn map_record(record: &Value) -> Option<ImageRecord> {
    let url = [
        pointer_str(record, "/image/source/url"),
        pointer_str(record, "/url"),
        pointer_str(record, "/preview/url"),
    ]
    .into_iter()
    .flatten()
    .find(|u| is_http_url(u))?
    .to_string();

    let thumbnail = [
        pointer_str(record, "/thumbnails/0/url"),
        pointer_str(record, "/preview/url"),
    ]
    .into_iter()
    .flatten()
    .find(|u| is_http_url(u))
    .map(str::to_string)
    .unwrap_or_else(|| url.clone());

    let id = match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => url.clone(),
    };

    let title = pointer_str(record, "/title")
        .unwrap_or_default()
        .trim()
        .to_string();

    let tags = record
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("name").and_then(Value::as_str).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ImageRecord {
        id,
        url,
        thumbnail,
        title,
        tags,
    })
}

fn pointer_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}
