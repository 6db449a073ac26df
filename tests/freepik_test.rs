//! Wiremock tests for the Freepik client.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itinera::{FreepikClient, ImageProvider, ImageQuery, ItineraError, Orientation};

fn resource(id: u64, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "url": format!("https://www.freepik.com/free-photo/{id}"),
        "image": { "type": "photo", "source": { "url": format!("https://img.freepik.com/{id}.jpg") } },
        "thumbnails": [{ "url": format!("https://img.freepik.com/{id}_thumb.jpg") }]
    })
}

fn client(server: &MockServer) -> FreepikClient {
    FreepikClient::with_base_url("test_key", server.uri())
}

#[tokio::test]
async fn sends_term_limit_orientation_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources"))
        .and(header("x-freepik-api-key", "test_key"))
        .and(query_param("term", "louvre museum"))
        .and(query_param("limit", "2"))
        .and(query_param("filters[orientation][portrait]", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [resource(1, "Louvre"), resource(2, "Pyramid"), resource(3, "Extra")],
            "meta": { "current_page": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = client(&server)
        .search(&ImageQuery::new("louvre museum", 2, Orientation::Portrait))
        .await
        .unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].id, "1");
    assert_eq!(images[0].url, "https://img.freepik.com/1.jpg");
    assert_eq!(images[0].thumbnail, "https://img.freepik.com/1_thumb.jpg");
    assert_eq!(images[1].title, "Pyramid");
}

#[tokio::test]
async fn records_without_urls_are_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 9, "title": "broken" }, resource(4, "Seine")]
        })))
        .mount(&server)
        .await;

    let images = client(&server)
        .search(&ImageQuery::new("paris", 6, Orientation::Landscape))
        .await
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].title, "Seine");
}

#[tokio::test]
async fn empty_data_is_an_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let images = client(&server)
        .search(&ImageQuery::new("nowhere", 6, Orientation::Landscape))
        .await
        .unwrap();
    assert!(images.is_empty());
}

#[tokio::test]
async fn missing_data_array_is_shape_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .mount(&server)
        .await;

    let err = client(&server)
        .search(&ImageQuery::new("paris", 6, Orientation::Landscape))
        .await
        .unwrap_err();
    assert!(matches!(err, ItineraError::UpstreamShape(_)));
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let cases: [(u16, fn(&ItineraError) -> bool); 4] = [
        (429, |e| matches!(e, ItineraError::RateLimited { .. })),
        (401, |e| matches!(e, ItineraError::InvalidCredential(_))),
        (403, |e| matches!(e, ItineraError::CredentialSuspended(_))),
        (500, |e| matches!(e, ItineraError::Api { status: 500, .. })),
    ];

    for (status, check) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/resources"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client(&server)
            .search(&ImageQuery::new("paris", 6, Orientation::Landscape))
            .await
            .unwrap_err();
        assert!(check(&err), "status {status} mapped to {err:?}");
    }
}

#[tokio::test]
async fn rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resources"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let err = client(&server)
        .search(&ImageQuery::new("paris", 6, Orientation::Landscape))
        .await
        .unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}
