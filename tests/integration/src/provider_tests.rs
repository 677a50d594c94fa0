//! Provider-level integration tests: canned completions, streaming,
//! failure propagation, and retry-with-reselection across candidates.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::{arc, Behavior, ScriptedProvider};
use gateway_core::ProviderType;
use gateway_resilience::RetryConfig;
use gateway_routing::RouterConfig;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn provider_entry(id: &str, model: &'static str, provider: Arc<dyn gateway_core::LLMProvider>) -> ProviderEntry {
    ProviderEntry {
        provider,
        id: id.to_string(),
        provider_type: ProviderType::AzureOpenAI,
        models: vec![model],
    }
}

/// A router config with near-zero retry backoff, so retry tests don't sleep
/// through the default multi-second exponential delay.
fn fast_retry_router_config() -> RouterConfig {
    RouterConfig {
        retry: RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        },
        ..RouterConfig::default()
    }
}

#[tokio::test]
async fn canned_completion_reports_stop_as_the_finish_reason() {
    let server = TestServer::with_default_config().await;
    let response = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("test-model", "Hello")).await,
        StatusCode::OK,
    )
    .await;

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn usage_accounting_is_present_on_every_completion() {
    let server = TestServer::with_default_config().await;
    let response = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("test-model", "Hello")).await,
        StatusCode::OK,
    )
    .await;

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["usage"]["prompt_tokens"].as_u64().unwrap() > 0);
    assert!(body["usage"]["completion_tokens"].as_u64().unwrap() > 0);
    let total = body["usage"]["total_tokens"].as_u64().unwrap();
    assert_eq!(
        total,
        body["usage"]["prompt_tokens"].as_u64().unwrap() + body["usage"]["completion_tokens"].as_u64().unwrap()
    );
}

#[tokio::test]
async fn streaming_completion_emits_ordered_chunks_terminated_by_stop() {
    let provider = ScriptedProvider::new(
        "stream-provider",
        vec![Behavior::Stream {
            chunks: vec!["Hello".to_string(), " ".to_string(), "world".to_string(), "!".to_string()],
            cost_usd: 0.002,
        }],
    );
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("stream-provider", "test-model", arc(provider)))
        .start()
        .await;

    let request = json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "Hi"}],
        "stream": true,
    });
    let events = server.post_streaming("/v1/chat/completions", &request).await;

    assert!(!events.is_empty());
    let joined: String = events
        .iter()
        .filter(|e| *e != "[DONE]")
        .filter_map(|e| serde_json::from_str::<serde_json::Value>(e).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(str::to_string))
        .collect();
    assert_eq!(joined, "Hello world!");
    assert_eq!(events.last().map(String::as_str), Some("[DONE]"));
}

#[tokio::test]
async fn retryable_provider_failure_falls_over_to_the_next_candidate() {
    let failing = ScriptedProvider::always_fails("flaky");
    let healthy = ScriptedProvider::always_succeeds("backup");

    let server = TestServerBuilder::new()
        .with_provider(provider_entry("flaky", "shared-model", arc(failing)))
        .with_provider(provider_entry("backup", "shared-model", arc(healthy)))
        .with_router_config(fast_retry_router_config())
        .start()
        .await;

    let response = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("shared-model", "Hello")).await,
        StatusCode::OK,
    )
    .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["provider"], "backup");
}

#[tokio::test]
async fn all_candidates_failing_surfaces_as_a_gateway_error() {
    let first = ScriptedProvider::always_fails("dead-a");
    let second = ScriptedProvider::always_fails("dead-b");

    let server = TestServerBuilder::new()
        .with_provider(provider_entry("dead-a", "shared-model", arc(first)))
        .with_provider(provider_entry("dead-b", "shared-model", arc(second)))
        .with_router_config(fast_retry_router_config())
        .start()
        .await;

    let response = server.post_json("/v1/chat/completions", &openai_json_request("shared-model", "Hello")).await;
    assert!(response.status().is_server_error() || response.status() == StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn non_retryable_failure_does_not_reach_the_second_candidate() {
    let failing = Arc::new(ScriptedProvider::new(
        "strict",
        vec![Behavior::Fail {
            message: "invalid request".to_string(),
            retryable: false,
            status_code: Some(400),
        }],
    ));
    let backup = Arc::new(ScriptedProvider::always_succeeds("backup"));

    let server = TestServerBuilder::new()
        .with_provider(provider_entry("strict", "shared-model", failing.clone()))
        .with_provider(provider_entry("backup", "shared-model", backup.clone()))
        .start()
        .await;

    let response = server.post_json("/v1/chat/completions", &openai_json_request("shared-model", "Hello")).await;
    assert!(!response.status().is_success());
    assert_eq!(backup.call_count(), 0, "a non-retryable failure must not be retried against another candidate");
}

#[tokio::test]
async fn empty_assistant_content_is_a_valid_response() {
    let provider = ScriptedProvider::new(
        "empty-provider",
        vec![Behavior::Complete {
            content: String::new(),
            prompt_tokens: 3,
            completion_tokens: 0,
            cost_usd: 0.0,
        }],
    );
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("empty-provider", "test-model", arc(provider)))
        .start()
        .await;

    let response = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("test-model", "Hello")).await,
        StatusCode::OK,
    )
    .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "");
}

#[tokio::test]
async fn long_response_content_is_preserved_in_full() {
    let long_reply = "word ".repeat(1000);
    let provider = ScriptedProvider::new(
        "verbose-provider",
        vec![Behavior::Complete {
            content: long_reply.clone(),
            prompt_tokens: 10,
            completion_tokens: 1000,
            cost_usd: 0.05,
        }],
    );
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("verbose-provider", "test-model", arc(provider)))
        .start()
        .await;

    let response = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("test-model", "Tell me a long story")).await,
        StatusCode::OK,
    )
    .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], long_reply);
}

#[tokio::test]
async fn unicode_response_content_round_trips_exactly() {
    let reply = "こんにちは! 你好! 🌍🚀";
    let provider = ScriptedProvider::new(
        "unicode-provider",
        vec![Behavior::Complete {
            content: reply.to_string(),
            prompt_tokens: 5,
            completion_tokens: 5,
            cost_usd: 0.0,
        }],
    );
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("unicode-provider", "test-model", arc(provider)))
        .start()
        .await;

    let response = assert_status(
        server
            .post_json(
                "/v1/chat/completions",
                &openai_json_request("test-model", "Say hello in Japanese and Chinese with emojis"),
            )
            .await,
        StatusCode::OK,
    )
    .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], reply);
}

#[tokio::test]
async fn two_distinct_providers_each_resolve_their_own_model_concurrently() {
    let azure = Arc::new(ScriptedProvider::with_type(
        "azure",
        ProviderType::AzureOpenAI,
        vec![Behavior::Complete {
            content: "Azure response".to_string(),
            prompt_tokens: 5,
            completion_tokens: 5,
            cost_usd: 0.001,
        }],
    ));
    let bedrock = Arc::new(ScriptedProvider::with_type(
        "bedrock",
        ProviderType::Bedrock,
        vec![Behavior::Complete {
            content: "Bedrock response".to_string(),
            prompt_tokens: 5,
            completion_tokens: 5,
            cost_usd: 0.001,
        }],
    ));

    let server = TestServerBuilder::new()
        .with_provider(provider_entry("azure", "azure-model", azure))
        .with_provider(provider_entry("bedrock", "bedrock-model", bedrock))
        .start()
        .await;

    let (azure_resp, bedrock_resp) = tokio::join!(
        server.post_json("/v1/chat/completions", &openai_json_request("azure-model", "Hello")),
        server.post_json("/v1/chat/completions", &openai_json_request("bedrock-model", "Hello")),
    );

    let azure_body: serde_json::Value = assert_status(azure_resp, StatusCode::OK).await.json().await.unwrap();
    let bedrock_body: serde_json::Value = assert_status(bedrock_resp, StatusCode::OK).await.json().await.unwrap();
    assert_eq!(azure_body["choices"][0]["message"]["content"], "Azure response");
    assert_eq!(bedrock_body["choices"][0]["message"]["content"], "Bedrock response");
}

#[tokio::test]
async fn provider_timeout_is_reported_as_a_5xx_gateway_error() {
    let provider = Arc::new(ScriptedProvider::new(
        "timeout-provider",
        vec![Behavior::Fail {
            message: "upstream timed out".to_string(),
            retryable: true,
            status_code: Some(504),
        }],
    ));
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("timeout-provider", "test-model", provider))
        .start()
        .await;

    let response = server.post_json("/v1/chat/completions", &openai_json_request("test-model", "Hello")).await;
    assert!(response.status().is_server_error());
}

#[tokio::test]
async fn unhealthy_provider_is_reported_unhealthy_by_the_health_endpoint() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("flaky-health"));
    provider.set_healthy(false);
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("flaky-health", "test-model", provider))
        .start()
        .await;

    let response = server.get("/health").await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_ne!(body["status"], "healthy");
}
