//! Response cache integration tests: cache hits and tenant isolation.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::ScriptedProvider;
use gateway_core::ProviderType;
use gateway_resilience::CacheConfig;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn identical_request_is_served_from_cache_without_a_second_provider_call() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(ProviderEntry {
            provider: provider.clone(),
            id: "test-provider".to_string(),
            provider_type: ProviderType::AzureOpenAI,
            models: vec!["test-model"],
        })
        .start()
        .await;

    let request = openai_json_request("test-model", "What is 2+2?");

    let first = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    let first_body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first_body["cache_hit"], false);

    let second = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    let second_body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second_body["cache_hit"], true);
    assert_eq!(
        first_body["choices"][0]["message"]["content"],
        second_body["choices"][0]["message"]["content"]
    );

    assert_eq!(provider.call_count(), 1, "second request should have been served from cache");
}

#[tokio::test]
async fn different_prompts_are_not_conflated_in_the_cache() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(ProviderEntry {
            provider: provider.clone(),
            id: "test-provider".to_string(),
            provider_type: ProviderType::AzureOpenAI,
            models: vec!["test-model"],
        })
        .start()
        .await;

    let request1 = openai_json_request("test-model", "What is 2+2?");
    let request2 = openai_json_request("test-model", "What is 3+3?");

    assert_status(server.post_json("/v1/chat/completions", &request1).await, StatusCode::OK).await;
    assert_status(server.post_json("/v1/chat/completions", &request2).await, StatusCode::OK).await;

    assert_eq!(provider.call_count(), 2, "distinct prompts must each dispatch to the provider");
}

#[tokio::test]
async fn different_tenants_do_not_share_cache_entries() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(ProviderEntry {
            provider: provider.clone(),
            id: "test-provider".to_string(),
            provider_type: ProviderType::AzureOpenAI,
            models: vec!["test-model"],
        })
        .start()
        .await;

    let request = openai_json_request("test-model", "Hello");

    let tenant_a = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("authorization", "Bearer test-token")
        .header("x-tenant-id", "tenant-a")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(tenant_a.status(), StatusCode::OK);

    let tenant_b = server
        .client
        .post(format!("{}/v1/chat/completions", server.base_url()))
        .header("authorization", "Bearer test-token")
        .header("x-tenant-id", "tenant-b")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(tenant_b.status(), StatusCode::OK);

    assert_eq!(provider.call_count(), 2, "the same prompt under two tenants must not share a cache entry");
}

#[tokio::test]
async fn streaming_requests_are_not_served_from_cache() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(ProviderEntry {
            provider: provider.clone(),
            id: "test-provider".to_string(),
            provider_type: ProviderType::AzureOpenAI,
            models: vec!["test-model"],
        })
        .start()
        .await;

    let request = json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": true,
    });

    server.post_streaming("/v1/chat/completions", &request).await;
    server.post_streaming("/v1/chat/completions", &request).await;

    assert_eq!(provider.call_count(), 2, "streaming completions bypass the response cache");
}

#[tokio::test]
async fn cache_disabled_dispatches_every_request_to_the_provider() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(ProviderEntry {
            provider: provider.clone(),
            id: "test-provider".to_string(),
            provider_type: ProviderType::AzureOpenAI,
            models: vec!["test-model"],
        })
        .with_cache_config(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
        .start()
        .await;

    let request = openai_json_request("test-model", "Hello");
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;

    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn models_list_is_stable_across_repeated_calls() {
    let server = TestServer::with_default_config().await;

    let first = assert_status(server.get("/v1/models").await, StatusCode::OK).await;
    let first_body: serde_json::Value = first.json().await.unwrap();

    let second = assert_status(server.get("/v1/models").await, StatusCode::OK).await;
    let second_body: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first_body["data"], second_body["data"]);
}
