// Key-based relay: POST prompt -> generateContent -> {"curriculum": ...}

use super::test_utils::{
    candidate_response, expected_payload, generate_path, read_response, TestServer,
    TEST_API_KEY,
};
use axum::http::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_relay_returns_curriculum() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .and(query_param("key", TEST_API_KEY))
        .and(body_json(expected_payload("Plan a biology unit")))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response("Lesson 1...")))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let response = server
        .call(TestServer::make_request(
            "POST",
            "/api/generate-curriculum",
            Some(r#"{"prompt": "Plan a biology unit"}"#),
        ))
        .await;

    let content_type = response
        .headers()
        .get("content-type")
        .expect("Response should have content-type header")
        .to_str()
        .unwrap()
        .to_string();
    let (status, body) = read_response(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    assert_eq!(body, r#"{"curriculum":"Lesson 1..."}"#);
}

#[tokio::test]
async fn test_legacy_function_path() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response("Week 1")))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let response = server
        .call(TestServer::make_request(
            "POST",
            "/.netlify/functions/generateCurriculum",
            Some(r#"{"prompt": "Chemistry"}"#),
        ))
        .await;

    let (status, body) = read_response(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"curriculum":"Week 1"}"#);
}

#[tokio::test]
async fn test_identical_requests_yield_identical_bodies() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(candidate_response("Module A\nModule B")),
        )
        .expect(2)
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let first = server.post_prompt(r#"{"prompt": "Geometry"}"#).await;
    let second = server.post_prompt(r#"{"prompt": "Geometry"}"#).await;

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_zero_candidates_is_500_without_leaking_payload() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY", "internalMarker": "do-not-leak"}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let (status, body) = server.post_prompt(r#"{"prompt": "Something blocked"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body).expect("Error response should be valid JSON");
    assert_eq!(
        json["error"],
        "Received an invalid or empty response from the AI model."
    );
    assert!(!body.contains("do-not-leak"));
    assert!(!body.contains("SAFETY"));
}

#[tokio::test]
async fn test_candidate_without_parts_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "SAFETY"}]
        })))
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let (status, _) = server.post_prompt(r#"{"prompt": "x"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_upstream_status_is_relayed_with_generic_message() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": 503, "message": "raw upstream overload detail", "status": "UNAVAILABLE"}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let (status, body) = server.post_prompt(r#"{"prompt": "History"}"#).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body,
        r#"{"error":"Failed to get a response from the AI model."}"#
    );
}

#[tokio::test]
async fn test_upstream_client_error_status_is_relayed() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .mount(&upstream)
        .await;

    let server = TestServer::api_key(&upstream);
    let (status, body) = server.post_prompt(r#"{"prompt": "History"}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.contains("API key not valid"));
}
