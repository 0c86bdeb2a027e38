//! Tests for the callback client against a mock HTTP server.
//!
//! Covers the outcome mapping the execution engine relies on: any HTTP
//! status is an outcome, transport-level failures are a distinct error.

use reqwest::Method;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cadence_core::client::CallbackClient;
use cadence_core::config::HttpClientConfig;
use cadence_core::error::ErrorCode;

fn client() -> CallbackClient {
    CallbackClient::new(&HttpClientConfig::default()).unwrap()
}

#[tokio::test]
async fn test_call_returns_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let status = client()
        .call(&format!("{}/hook", server.uri()), Method::GET, Uuid::new_v4(), None)
        .await
        .unwrap();

    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_call_returns_error_status_without_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let status = client()
        .call(&format!("{}/hook", server.uri()), Method::GET, Uuid::new_v4(), None)
        .await
        .unwrap();

    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_call_sends_idempotency_key() {
    let server = MockServer::start().await;
    let execution_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/hook"))
        .and(header("X-Idempotency-Key", execution_id.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let status = client()
        .call(&format!("{}/hook", server.uri()), Method::GET, execution_id, None)
        .await
        .unwrap();

    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_post_carries_json_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let body = serde_json::json!({"ping": true});
    let status = client()
        .call(
            &format!("{}/hook", server.uri()),
            Method::POST,
            Uuid::new_v4(),
            Some(&body),
        )
        .await
        .unwrap();

    assert_eq!(status, 201);
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    // Nothing listens on port 9; the connect fails below the HTTP layer.
    let err = client()
        .call("http://127.0.0.1:9/hook", Method::GET, Uuid::new_v4(), None)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransportError);
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
        .mount(&server)
        .await;

    let impatient = CallbackClient::new(&HttpClientConfig {
        timeout_seconds: 1,
        connect_timeout_seconds: 1,
    })
    .unwrap();

    let err = impatient
        .call(&format!("{}/slow", server.uri()), Method::GET, Uuid::new_v4(), None)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransportError);
}
