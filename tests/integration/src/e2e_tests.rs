//! End-to-end integration tests covering full request flows across the
//! real HTTP surface, middleware stack, and router.

use crate::fixtures::*;
use crate::helpers::*;
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn full_chat_completion_response_shape_is_openai_compatible() {
    init_tracing();
    let server = TestServer::with_default_config().await;

    let request = json!({
        "model": "test-model",
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "What is the capital of France?"},
        ],
        "temperature": 0.7,
        "max_tokens": 100,
    });

    let response = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();

    assert!(body["id"].is_string());
    assert_eq!(body["object"], "chat.completion");
    assert!(body["created"].is_number());
    assert_eq!(body["model"], "test-model");
    let choices = body["choices"].as_array().unwrap();
    assert!(!choices.is_empty());

    let choice = &choices[0];
    assert_eq!(choice["index"], 0);
    assert!(choice["message"]["role"].is_string());
    assert!(choice["message"]["content"].is_string());
    assert!(choice["finish_reason"].is_string());

    assert!(body["usage"]["prompt_tokens"].is_number());
    assert!(body["usage"]["completion_tokens"].is_number());
    assert!(body["usage"]["total_tokens"].is_number());
}

#[tokio::test]
async fn multi_turn_conversation_round_trips_assistant_reply_as_context() {
    let server = TestServer::with_default_config().await;

    let request1 = chat_request_for("test-model", "My name is Alice.");
    let response1 = assert_status(server.post_json("/v1/chat/completions", &request1).await, StatusCode::OK).await;
    let body1: serde_json::Value = response1.json().await.unwrap();
    let assistant_reply = body1["choices"][0]["message"]["content"].as_str().unwrap().to_string();

    let request2 = json!({
        "model": "test-model",
        "messages": [
            {"role": "user", "content": "My name is Alice."},
            {"role": "assistant", "content": assistant_reply},
            {"role": "user", "content": "What is my name?"},
        ],
    });
    assert_status(server.post_json("/v1/chat/completions", &request2).await, StatusCode::OK).await;
}

#[tokio::test]
async fn health_liveness_and_readiness_endpoints_all_pass() {
    let server = TestServer::with_default_config().await;

    assert_status(server.get("/health/live").await, StatusCode::OK).await;
    assert_status(server.get("/health/ready").await, StatusCode::OK).await;
    assert_status(server.get("/health").await, StatusCode::OK).await;
}

#[tokio::test]
async fn model_discovery_feeds_directly_into_a_completion_request() {
    let server = TestServer::with_default_config().await;

    let response = assert_status(server.get("/v1/models").await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let models = body["data"].as_array().unwrap();
    assert!(!models.is_empty());

    let model_id = models[0]["id"].as_str().unwrap().to_string();
    let request = chat_request_for(&model_id, "Hello");
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn request_with_every_optional_parameter_succeeds() {
    let server = TestServer::with_default_config().await;

    let request = json!({
        "model": "test-model",
        "messages": [
            {"role": "system", "content": "Be concise."},
            {"role": "user", "content": "Say hello."},
        ],
        "temperature": 0.5,
        "max_tokens": 50,
        "top_p": 0.9,
        "frequency_penalty": 0.1,
        "presence_penalty": 0.1,
        "stop": ["\n\n"],
        "user": "test-user-e2e",
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn ten_concurrent_users_all_receive_responses() {
    let server = TestServer::with_default_config().await;

    let futures: Vec<_> = (0..10)
        .map(|i| {
            let request = json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": format!("Hello from user {i}")}],
                "user": format!("user-{i}"),
            });
            server.post_json("/v1/chat/completions", &request)
        })
        .collect();

    let results = futures::future::join_all(futures).await;
    for response in results {
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn single_request_latency_is_well_under_a_second_locally() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello");

    let start = Instant::now();
    let response = server.post_json("/v1/chat/completions", &request).await;
    let latency = start.elapsed();

    assert_status(response, StatusCode::OK).await;
    assert!(latency < Duration::from_secs(1));
}

#[tokio::test]
async fn malformed_body_is_rejected_before_reaching_the_router() {
    let server = TestServer::with_default_config().await;

    let response = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("authorization", "Bearer test-token")
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("request should succeed at the transport level");
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn empty_body_is_rejected_as_a_validation_error() {
    let server = TestServer::with_default_config().await;
    let response = server.post_json("/v1/chat/completions", &json!({})).await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn large_conversation_history_is_accepted() {
    let server = TestServer::with_default_config().await;

    let messages: Vec<serde_json::Value> = (0..50)
        .map(|i| {
            json!({
                "role": if i % 2 == 0 { "user" } else { "assistant" },
                "content": format!("This is message number {i} in our conversation."),
            })
        })
        .collect();

    let request = json!({ "model": "test-model", "messages": messages });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn special_characters_in_content_are_passed_through_untouched() {
    let server = TestServer::with_default_config().await;
    let request = json!({
        "model": "test-model",
        "messages": [{
            "role": "user",
            "content": "Test special chars: <script>alert('xss')</script> & \"quotes\" 'apostrophes' \n\t",
        }],
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn unicode_content_round_trips_correctly() {
    let server = TestServer::with_default_config().await;
    let request = json!({
        "model": "test-model",
        "messages": [{
            "role": "user",
            "content": "Translate: 你好世界 → Hello World, こんにちは → Hello, مرحبا → Hello 🌍🚀",
        }],
    });
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
}

#[tokio::test]
async fn ten_rapid_sequential_requests_all_succeed() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Quick!");

    for _ in 0..10 {
        let response = server.post_json("/v1/chat/completions", &request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn both_bearer_token_and_x_api_key_authenticate_successfully() {
    let server = TestServer::with_default_config().await;
    let request = openai_json_request("test-model", "Hello");

    let via_api_key = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("x-api-key", "dev-key")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_status(via_api_key, StatusCode::OK).await;

    let via_bearer = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("authorization", "Bearer test-token")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_status(via_bearer, StatusCode::OK).await;
}

#[tokio::test]
async fn full_workflow_discover_complete_continue() {
    let server = TestServer::with_default_config().await;

    assert_status(server.get("/health").await, StatusCode::OK).await;

    let models_body: serde_json::Value =
        assert_status(server.get("/v1/models").await, StatusCode::OK).await.json().await.unwrap();
    let models = models_body["data"].as_array().unwrap();
    assert!(!models.is_empty());
    let model = models[0]["id"].as_str().unwrap().to_string();

    let request = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "What is 2+2?"},
        ],
    });
    let response = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let reply = body["choices"][0]["message"]["content"].as_str().unwrap().to_string();
    assert!(!reply.is_empty());

    let follow_up = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "What is 2+2?"},
            {"role": "assistant", "content": reply},
            {"role": "user", "content": "And 3+3?"},
        ],
    });
    assert_status(server.post_json("/v1/chat/completions", &follow_up).await, StatusCode::OK).await;
}

#[cfg(test)]
mod resilience_tests {
    use super::*;

    #[tokio::test]
    async fn repeated_requests_after_a_transient_gap_all_succeed() {
        let server = TestServer::with_default_config().await;
        let request = openai_json_request("test-model", "Hello");

        let response1 = server.post_json("/v1/chat/completions", &request).await;
        assert_status(response1, StatusCode::OK).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let response2 = server.post_json("/v1/chat/completions", &request).await;
        assert_status(response2, StatusCode::OK).await;
    }

    #[tokio::test]
    async fn sustained_low_rate_load_keeps_succeeding() {
        let server = TestServer::with_default_config().await;
        let request = openai_json_request("test-model", "Hello");
        let duration = Duration::from_millis(500);
        let start = Instant::now();
        let mut request_count = 0u32;
        let mut success_count = 0u32;

        while start.elapsed() < duration {
            let response = server.post_json("/v1/chat/completions", &request).await;
            request_count += 1;
            if response.status() == StatusCode::OK {
                success_count += 1;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(success_count, request_count, "every request against a healthy stub provider should succeed");
    }
}
