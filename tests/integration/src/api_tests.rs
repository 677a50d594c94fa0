//! API endpoint integration tests: the happy path across the HTTP surface.

use crate::fixtures::*;
use crate::helpers::*;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn health_endpoint_reports_healthy_with_one_registered_provider() {
    init_tracing();
    let server = TestServer::with_default_config().await;

    let response = assert_status(server.get("/health").await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn readiness_endpoint_is_reachable_without_auth() {
    let server = TestServer::with_default_config().await;
    assert_status(server.get("/health/ready").await, StatusCode::OK).await;
}

#[tokio::test]
async fn liveness_endpoint_is_reachable_without_auth() {
    let server = TestServer::with_default_config().await;
    assert_status(server.get("/health/live").await, StatusCode::OK).await;
}

#[tokio::test]
async fn metrics_endpoint_is_reachable_without_auth() {
    let server = TestServer::with_default_config().await;
    assert_status(server.get("/metrics").await, StatusCode::OK).await;
}

#[tokio::test]
async fn list_models_returns_the_registered_catalog() {
    let server = TestServer::with_default_config().await;

    let response = assert_status(server.get("/v1/models").await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["object"], "list");
    let data = body["data"].as_array().expect("data is an array");
    assert!(data.iter().any(|m| m["id"] == "test-model"));
    for model in data {
        assert!(model["id"].is_string());
        assert_eq!(model["object"], "model");
    }
}

#[tokio::test]
async fn chat_completion_returns_a_well_formed_response() {
    let server = TestServer::with_default_config().await;

    let request = openai_json_request("test-model", "Hello!");
    let response = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert!(body["id"].is_string());
    let choices = body["choices"].as_array().expect("choices is an array");
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0]["message"]["role"], "assistant");
    assert!(body["usage"]["prompt_tokens"].is_number());
    assert!(body["usage"]["completion_tokens"].is_number());
    assert!(body["usage"]["total_tokens"].is_number());
}

#[tokio::test]
async fn chat_completion_with_system_message_succeeds() {
    let server = TestServer::with_default_config().await;
    let request = json!({
        "model": "test-model",
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello!"},
        ],
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn chat_completion_with_multi_turn_conversation_succeeds() {
    let server = TestServer::with_default_config().await;
    let request = json!({
        "model": "test-model",
        "messages": [
            {"role": "user", "content": "What is 2+2?"},
            {"role": "assistant", "content": "2+2 equals 4."},
            {"role": "user", "content": "And what is that times 3?"},
        ],
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn chat_completion_accepts_full_optional_parameter_set() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request_full(
        "test-model",
        vec![json!({"role": "user", "content": "Hello!"})],
        0.7,
        100,
        false,
    );
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn request_with_x_api_key_header_is_accepted() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello!");
    let response = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("x-api-key", "dev-key")
        .json(&request)
        .send()
        .await
        .expect("request should succeed at the transport level");
    assert_status(response, StatusCode::OK).await;
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello!");
    let response = server.post_json_as("/v1/chat/completions", None, &request).await;
    assert_status(response, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn unknown_route_is_404() {
    let server = TestServer::with_default_config().await;
    assert_status(server.get("/v1/unknown").await, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn empty_messages_array_is_rejected() {
    let server = TestServer::with_default_config().await;
    let request = json!({"model": "test-model", "messages": []});
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn invalid_json_body_is_rejected() {
    let server = TestServer::with_default_config().await;
    let response = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("authorization", "Bearer test-token")
        .header("content-type", "application/json")
        .body("not valid json")
        .send()
        .await
        .expect("request should succeed at the transport level");
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn missing_model_field_is_rejected() {
    let server = TestServer::with_default_config().await;
    let request = json!({"messages": [{"role": "user", "content": "Hello!"}]});
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn out_of_range_temperature_is_rejected() {
    let server = TestServer::with_default_config().await;
    let request = json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "Hello!"}],
        "temperature": 3.0,
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn model_not_registered_is_reported_as_bad_request() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("no-such-model", "Hello!");
    let response = server.post_json("/v1/chat/completions", &request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_requests_all_succeed_against_the_same_provider() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello!");

    let futures: Vec<_> = (0..10)
        .map(|_| server.post_json("/v1/chat/completions", &request))
        .collect();
    let results = futures::future::join_all(futures).await;

    for response in results {
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn usage_endpoint_reports_tenant_and_global_spend() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello!");
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;

    let response = assert_status(server.get("/v1/usage").await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["tenant_spend_usd"].is_number());
    assert!(body["global_spend_usd"].is_number());
}
