//! Integration tests for counter store backings.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itinera::{
    CounterStore, ItineraError, JsonFileStore, ManualClock, MemoryStore, QuotaPolicy, QuotaTracker,
    RemoteStore, UsageCounters,
};

fn sample_counters() -> UsageCounters {
    let mut counters = UsageCounters::default();
    counters.minute.count = 2;
    counters.minute.start_time = 1_778_414_400_000;
    counters.daily.count = 7;
    counters.daily.date = "2026-05-10".into();
    counters.monthly.count = 31;
    counters.monthly.month = "2026-05".into();
    counters.last_request_time = 1_778_414_401_000;
    counters
}

// ============================================================================
// Memory
// ============================================================================

#[tokio::test]
async fn memory_store_keeps_apis_apart() {
    let store = MemoryStore::new();
    store.save("llm", &sample_counters()).await.unwrap();

    assert_eq!(store.load("llm").await.unwrap(), Some(sample_counters()));
    assert!(store.load("images").await.unwrap().is_none());
}

// ============================================================================
// JSON file
// ============================================================================

#[tokio::test]
async fn file_store_round_trips_camel_case_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    store.save("llm", &sample_counters()).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("llm.json")).unwrap()).unwrap();
    assert_eq!(raw["minute"]["startTime"], 1_778_414_400_000_i64);
    assert_eq!(raw["daily"]["date"], "2026-05-10");
    assert_eq!(raw["monthly"]["count"], 31);
    assert_eq!(raw["lastRequestTime"], 1_778_414_401_000_i64);

    assert_eq!(store.load("llm").await.unwrap(), Some(sample_counters()));
}

#[tokio::test]
async fn file_store_reads_documents_with_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("images.json"),
        r#"{"monthly":{"count":12,"month":"2026-05"}}"#,
    )
    .unwrap();
    let store = JsonFileStore::new(dir.path());

    let counters = store.load("images").await.unwrap().unwrap();
    assert_eq!(counters.monthly.count, 12);
    assert_eq!(counters.daily.count, 0);
    assert_eq!(counters.minute.start_time, 0);
}

#[tokio::test]
async fn quota_survives_a_restart_through_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap();
    let policy = QuotaPolicy::new().max_per_month(3);

    let first = QuotaTracker::new("images", policy.clone(), Arc::new(JsonFileStore::new(dir.path())))
        .with_clock(Arc::new(ManualClock::new(start)));
    first.check_and_reserve().await.unwrap();
    first.check_and_reserve().await.unwrap();
    drop(first);

    let restarted = QuotaTracker::new("images", policy, Arc::new(JsonFileStore::new(dir.path())))
        .with_clock(Arc::new(ManualClock::new(start)));
    restarted.check_and_reserve().await.unwrap();
    let err = restarted.check_and_reserve().await.unwrap_err();
    assert!(matches!(err, ItineraError::QuotaExceeded { .. }));
}

// ============================================================================
// Remote
// ============================================================================

#[tokio::test]
async fn remote_store_loads_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage"))
        .and(query_param("api", "llm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "api": "llm",
            "counters": serde_json::to_value(sample_counters()).unwrap()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = RemoteStore::new(server.uri());
    assert_eq!(store.load("llm").await.unwrap(), Some(sample_counters()));
}

#[tokio::test]
async fn remote_store_treats_null_counters_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage"))
        .and(query_param("api", "images"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "api": "images", "counters": null })),
        )
        .mount(&server)
        .await;

    let store = RemoteStore::new(server.uri());
    assert!(store.load("images").await.unwrap().is_none());
}

#[tokio::test]
async fn remote_store_without_usage_endpoint_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "usage store is not exposed" })),
        )
        .mount(&server)
        .await;

    let store = RemoteStore::new(server.uri());
    assert!(matches!(
        store.load("llm").await,
        Err(ItineraError::Persistence(_))
    ));
}

#[tokio::test]
async fn remote_store_conditional_write_sends_expected_revision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/usage"))
        .and(body_partial_json(json!({ "api": "llm", "expectedRevision": 3 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/usage"))
        .and(body_partial_json(json!({ "api": "llm", "expectedRevision": 2 })))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let store = RemoteStore::new(server.uri());
    let mut counters = sample_counters();
    counters.revision = 4;
    store.save_if("llm", 3, &counters).await.unwrap();
    assert!(matches!(
        store.save_if("llm", 2, &counters).await,
        Err(ItineraError::CounterConflict { expected: 2, .. })
    ));
}

#[tokio::test]
async fn remote_store_posts_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/usage"))
        .and(body_partial_json(json!({
            "api": "llm",
            "counters": { "monthly": { "count": 31, "month": "2026-05" } }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    RemoteStore::new(format!("{}/", server.uri()))
        .save("llm", &sample_counters())
        .await
        .unwrap();
}

#[tokio::test]
async fn remote_store_errors_are_persistence_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/usage"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = RemoteStore::new(server.uri());
    assert!(matches!(
        store.load("llm").await,
        Err(ItineraError::Persistence(_))
    ));
    assert!(matches!(
        store.save("llm", &sample_counters()).await,
        Err(ItineraError::Persistence(_))
    ));
}

#[tokio::test]
async fn remote_store_validates_api_names_locally() {
    let server = MockServer::start().await;
    let store = RemoteStore::new(server.uri());
    assert!(matches!(
        store.load("no/slashes").await,
        Err(ItineraError::InvalidInput(_))
    ));
}
