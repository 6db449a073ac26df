//! Remote key-value counter store.
//!
//! Speaks the `/usage` protocol served by `itinerad`:
//!
//! - `GET {base}/usage?api=<name>` → `200 {api, counters}` (`counters` is
//!   `null` when nothing was saved yet)
//! - `POST {base}/usage` with `{api, counters, expectedRevision?}` → `200`,
//!   or `409` when `expectedRevision` no longer matches the stored document
//!
//! A `404` means the endpoint is not served at all, not that the counters
//! are missing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CounterStore, validate_api_name};
use crate::quota::UsageCounters;
use crate::{ItineraError, Result};

/// Wire document exchanged on `/usage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDocument {
    pub api: String,
    #[serde(default)]
    pub counters: Option<UsageCounters>,
    /// Write only if the stored revision still matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<u64>,
}

/// Counter store backed by a remote `/usage` endpoint.
#[derive(Clone)]
pub struct RemoteStore {
    http: Client,
    base_url: String,
}

impl RemoteStore {
    /// Default per-request timeout for counter reads and writes.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn usage_url(&self) -> String {
        format!("{}/usage", self.base_url)
    }

    async fn post(&self, doc: &UsageDocument) -> Result<()> {
        let response = self
            .http
            .post(self.usage_url())
            .json(doc)
            .send()
            .await
            .map_err(persistence_err)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::CONFLICT => Err(ItineraError::CounterConflict {
                api: doc.api.clone(),
                expected: doc.expected_revision.unwrap_or_default(),
            }),
            status => Err(ItineraError::Persistence(format!(
                "usage write returned {status}"
            ))),
        }
    }
}

fn persistence_err(e: impl std::fmt::Display) -> ItineraError {
    ItineraError::Persistence(e.to_string())
}

#[async_trait]
impl CounterStore for RemoteStore {
    fn name(&self) -> &str {
        "remote"
    }

    async fn load(&self, api: &str) -> Result<Option<UsageCounters>> {
        validate_api_name(api)?;
        let response = self
            .http
            .get(self.usage_url())
            .query(&[("api", api)])
            .send()
            .await
            .map_err(persistence_err)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ItineraError::Persistence(format!(
                "{} does not serve usage counters",
                self.usage_url()
            )));
        }
        if !response.status().is_success() {
            return Err(ItineraError::Persistence(format!(
                "usage read returned {}",
                response.status()
            )));
        }

        let doc: UsageDocument = response.json().await.map_err(persistence_err)?;
        Ok(doc.counters)
    }

    async fn save(&self, api: &str, counters: &UsageCounters) -> Result<()> {
        validate_api_name(api)?;
        self.post(&UsageDocument {
            api: api.to_string(),
            counters: Some(counters.clone()),
            expected_revision: None,
        })
        .await
    }

    async fn save_if(&self, api: &str, expected: u64, counters: &UsageCounters) -> Result<()> {
        validate_api_name(api)?;
        self.post(&UsageDocument {
            api: api.to_string(),
            counters: Some(counters.clone()),
            expected_revision: Some(expected),
        })
        .await
    }
}
