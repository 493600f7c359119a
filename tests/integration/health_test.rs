// Health endpoint and response headers
use super::test_utils::{read_response, TestServer, TEST_MODEL};
use axum::http::StatusCode;
use serde_json::Value;
use wiremock::MockServer;

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockServer::start().await;
    let server = TestServer::api_key(&upstream);

    let response = server
        .call(TestServer::make_request("GET", "/health", None))
        .await;

    assert_eq!(
        response.headers()["cache-control"],
        "no-cache, no-store, must-revalidate"
    );
    let (status, body) = read_response(response).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).expect("Health response is not valid JSON");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["auth_mode"], "api_key");
    assert_eq!(json["model"], TEST_MODEL);
    assert!(
        json.get("version").is_some(),
        "Health response should include version"
    );
}

#[tokio::test]
async fn test_health_reports_auth_mode() {
    let upstream = MockServer::start().await;

    let server = TestServer::service_account(&upstream);
    let response = server
        .call(TestServer::make_request("GET", "/health", None))
        .await;
    let (_, body) = read_response(response).await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["auth_mode"], "service_account");

    let server = TestServer::unconfigured();
    let response = server
        .call(TestServer::make_request("GET", "/health", None))
        .await;
    let (_, body) = read_response(response).await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["auth_mode"], "unconfigured");
}

#[tokio::test]
async fn test_security_headers_on_relay_responses() {
    let server = TestServer::unconfigured();

    let response = server
        .call(TestServer::make_request(
            "GET",
            "/api/generate-curriculum",
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["cache-control"], "no-store");
}
