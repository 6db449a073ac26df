use std::time::Duration;

use itinera::{ItineraError, QuotaScope, Result};

fn quota(scope: QuotaScope) -> ItineraError {
    ItineraError::QuotaExceeded {
        api: "llm".into(),
        scope,
        limit: 1500,
        retry_after: Duration::from_secs(90),
    }
}

#[test]
fn quota_error_names_api_scope_and_limit() {
    let msg = quota(QuotaScope::Day).to_string();
    assert!(msg.contains("llm"));
    assert!(msg.contains("day"));
    assert!(msg.contains("1500"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(ItineraError::NoProvider)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(ItineraError::RateLimited { retry_after: None }.is_transient());
    assert!(ItineraError::Http("connection reset".into()).is_transient());
    assert!(ItineraError::Timeout(Duration::from_secs(30)).is_transient());
    assert!(ItineraError::EmptyResponse.is_transient());
    assert!(
        ItineraError::CounterConflict {
            api: "llm".into(),
            expected: 2
        }
        .is_transient()
    );
    for status in [429, 500, 502, 503, 504] {
        assert!(
            ItineraError::Api {
                status,
                message: "x".into()
            }
            .is_transient(),
            "status {status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!ItineraError::InvalidCredential("x".into()).is_transient());
    assert!(!ItineraError::CredentialSuspended("x".into()).is_transient());
    assert!(!ItineraError::InvalidInput("x".into()).is_transient());
    assert!(!ItineraError::UpstreamShape("x".into()).is_transient());
    assert!(!ItineraError::Upstream("x".into()).is_transient());
    assert!(!ItineraError::NoProvider.is_transient());
    assert!(!quota(QuotaScope::Minute).is_transient());
    assert!(
        !ItineraError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
}

#[test]
fn only_credential_errors_are_fatal() {
    assert!(ItineraError::InvalidCredential("x".into()).is_fatal());
    assert!(ItineraError::CredentialSuspended("x".into()).is_fatal());
    assert!(!ItineraError::RateLimited { retry_after: None }.is_fatal());
    assert!(!ItineraError::UpstreamShape("x".into()).is_fatal());
    assert!(!quota(QuotaScope::Month).is_fatal());
}

#[test]
fn retry_after_hints() {
    assert_eq!(
        ItineraError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
        .retry_after(),
        Some(Duration::from_secs(7))
    );
    assert_eq!(
        quota(QuotaScope::Minute).retry_after(),
        Some(Duration::from_secs(90))
    );
    assert_eq!(ItineraError::Http("x".into()).retry_after(), None);
}

// ============================================================================
// Upstream message classification
// ============================================================================

#[test]
fn classifies_upstream_messages() {
    assert!(matches!(
        ItineraError::from_upstream_message("API key not valid. Please pass a valid API key."),
        ItineraError::InvalidCredential(_)
    ));
    assert!(matches!(
        ItineraError::from_upstream_message("Consumer has been suspended"),
        ItineraError::CredentialSuspended(_)
    ));
    assert!(matches!(
        ItineraError::from_upstream_message("Quota exceeded for metric generate_content"),
        ItineraError::RateLimited { .. }
    ));
    assert!(matches!(
        ItineraError::from_upstream_message("The model is overloaded. Please try again later."),
        ItineraError::Api { status: 503, .. }
    ));
    assert!(matches!(
        ItineraError::from_upstream_message("request timed out"),
        ItineraError::Timeout(_)
    ));
    assert!(matches!(
        ItineraError::from_upstream_message("something odd"),
        ItineraError::Upstream(_)
    ));
}

#[test]
fn exhausted_reports_last_error() {
    let err = ItineraError::Exhausted {
        attempts: 3,
        last: Box::new(ItineraError::RateLimited { retry_after: None }),
    };
    let msg = err.to_string();
    assert!(msg.contains('3'));
    assert!(msg.contains("rate limited"));
    assert!(!err.is_transient());
}

#[test]
fn json_errors_convert() {
    let err: ItineraError = serde_json::from_str::<serde_json::Value>("{oops")
        .unwrap_err()
        .into();
    assert!(matches!(err, ItineraError::Json(_)));
}
