//! HTTP routes served by itinerad.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::gateway::Gateway;
use crate::ItineraError;
use crate::store::{CounterStore, UsageDocument, validate_api_name};
use crate::types::Orientation;

/// Fallback `retryAfter` when an upstream rate limit gave no hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Store exposed on `/usage`; `None` disables the endpoint.
    pub usage_store: Option<Arc<dyn CounterStore>>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            usage_store: None,
        }
    }

    pub fn with_usage_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.usage_store = Some(store);
        self
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/generate-itinerary", post(generate_itinerary))
        .route("/images/search", post(search_images))
        .route("/images/budget-status", get(budget_status))
        .route("/usage", get(read_usage).post(write_usage))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    model_name: Option<String>,
}

/// POST /generate-itinerary
async fn generate_itinerary(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_body(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state
        .gateway
        .generate(&request.prompt, request.model_name.as_deref())
        .await
    {
        Ok(generation) => Json(json!({
            "success": true,
            "text": generation.text,
            "model": generation.model,
            "timestamp": generation.timestamp.to_rfc3339(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageSearchRequest {
    #[serde(default)]
    activity_name: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    orientation: Option<Orientation>,
}

/// POST /images/search. Always 200; failures yield an empty list.
async fn search_images(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ImageSearchRequest>, JsonRejection>,
) -> Json<Value> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "malformed image search request");
            ImageSearchRequest::default()
        }
    };

    let images = if request.activity_name.trim().is_empty() {
        Vec::new()
    } else {
        state
            .gateway
            .search_images(
                &request.activity_name,
                request.limit.unwrap_or(0),
                request.orientation.unwrap_or_default(),
            )
            .await
    };

    Json(json!({
        "query": request.activity_name,
        "count": images.len(),
        "images": images,
    }))
}

/// GET /images/budget-status
async fn budget_status(State(state): State<Arc<AppState>>) -> Response {
    let client = match state.gateway.image_client() {
        Ok(client) => client,
        Err(_) => return error_body(StatusCode::NOT_FOUND, "image search is not configured"),
    };
    let usage = client.budget_status().await;
    Json(json!({
        "monthlyUsed": usage.monthly_used,
        "monthlyLimit": usage.monthly_limit,
        "dailyUsed": usage.daily_used,
        "dailyLimit": usage.daily_limit,
        "estimatedCost": usage.estimated_cost,
        "percentageUsed": usage.percentage_used,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    api: String,
}

/// GET /usage?api=<name>
async fn read_usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let Some(store) = &state.usage_store else {
        return error_body(StatusCode::NOT_FOUND, "usage store is not exposed");
    };
    if let Err(e) = validate_api_name(&query.api) {
        return error_response(&e);
    }
    match store.load(&query.api).await {
        Ok(counters) => Json(UsageDocument {
            api: query.api,
            counters,
            expected_revision: None,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /usage. With `expectedRevision` the write is conditional and a
/// stale revision answers 409.
async fn write_usage(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UsageDocument>, JsonRejection>,
) -> Response {
    let Some(store) = &state.usage_store else {
        return error_body(StatusCode::NOT_FOUND, "usage store is not exposed");
    };
    let Json(doc) = match body {
        Ok(body) => body,
        Err(rejection) => return error_body(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let Some(counters) = &doc.counters else {
        return error_body(StatusCode::BAD_REQUEST, "counters are required");
    };
    if let Err(e) = validate_api_name(&doc.api) {
        return error_response(&e);
    }
    let saved = match doc.expected_revision {
        Some(expected) => store.save_if(&doc.api, expected, counters).await,
        None => store.save(&doc.api, counters).await,
    };
    match saved {
        Ok(()) => Json(doc).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version_string(),
    }))
}

/// Map an error to its HTTP response.
pub(crate) fn error_response(e: &ItineraError) -> Response {
    match e {
        ItineraError::QuotaExceeded { retry_after, .. } => rate_limited(e.to_string(), *retry_after),
        ItineraError::Exhausted { last, .. }
            if matches!(
                **last,
                ItineraError::RateLimited { .. } | ItineraError::QuotaExceeded { .. }
            ) =>
        {
            rate_limited(
                e.to_string(),
                last.retry_after().unwrap_or(DEFAULT_RETRY_AFTER),
            )
        }
        ItineraError::InvalidCredential(_) => error_body(StatusCode::UNAUTHORIZED, e.to_string()),
        ItineraError::CredentialSuspended(_) => error_body(StatusCode::FORBIDDEN, e.to_string()),
        ItineraError::InvalidInput(_) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        ItineraError::CounterConflict { .. } => error_body(StatusCode::CONFLICT, e.to_string()),
        _ => {
            warn!(error = %e, "request failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn rate_limited(message: String, retry_after: Duration) -> Response {
    // round up so clients never retry early
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(json!({ "error": message, "retryAfter": secs })),
    )
        .into_response()
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
