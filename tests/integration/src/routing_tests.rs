//! Routing integration tests: model-based provider selection, preferred
//! provider override, and circuit-breaker trip behavior.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::{arc, ScriptedProvider};
use gateway_core::ProviderType;
use gateway_resilience::CircuitBreakerConfig;
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

#[tokio::test]
async fn each_model_is_dispatched_to_the_provider_that_serves_it() {
    let azure = Arc::new(ScriptedProvider::with_type(
        "azure",
        ProviderType::AzureOpenAI,
        vec![crate::mock_providers::Behavior::Complete {
            content: "from azure".to_string(),
            prompt_tokens: 5,
            completion_tokens: 5,
            cost_usd: 0.001,
        }],
    ));
    let bedrock = Arc::new(ScriptedProvider::with_type(
        "bedrock",
        ProviderType::Bedrock,
        vec![crate::mock_providers::Behavior::Complete {
            content: "from bedrock".to_string(),
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

    let azure_body: serde_json::Value = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("azure-model", "Hello")).await,
        StatusCode::OK,
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(azure_body["provider"], "azure");

    let bedrock_body: serde_json::Value = assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("bedrock-model", "Hello")).await,
        StatusCode::OK,
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(bedrock_body["provider"], "bedrock");
}

#[tokio::test]
async fn unknown_model_is_rejected_before_any_provider_is_contacted() {
    let provider = Arc::new(ScriptedProvider::always_succeeds("test-provider"));
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("test-provider", "test-model", provider.clone()))
        .start()
        .await;

    let response = server.post_json("/v1/chat/completions", &openai_json_request("no-such-model", "Hello")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn preferred_provider_metadata_overrides_priority_ordering() {
    let low_priority = Arc::new(ScriptedProvider::new(
        "low-priority",
        vec![crate::mock_providers::Behavior::Complete {
            content: "from low priority".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            cost_usd: 0.0,
        }],
    ));
    let high_priority = Arc::new(ScriptedProvider::new(
        "high-priority",
        vec![crate::mock_providers::Behavior::Complete {
            content: "from high priority".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            cost_usd: 0.0,
        }],
    ));

    // `high-priority` is registered second but with the same priority (both
    // default to index 0), so absent a preference, insertion order decides
    // the tie; explicitly preferring `low-priority` should still route there.
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("high-priority", "shared-model", high_priority))
        .with_provider(provider_entry("low-priority", "shared-model", low_priority.clone()))
        .start()
        .await;

    let request = json!({
        "model": "shared-model",
        "messages": [{"role": "user", "content": "Hello"}],
        "metadata": {"preferred_provider": "low-priority"},
    });
    let response = assert_status(server.post_json("/v1/chat/completions", &request).await, StatusCode::OK).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["provider"], "low-priority");
    assert_eq!(low_priority.call_count(), 1);
}

#[tokio::test]
async fn circuit_opens_after_the_failure_threshold_and_stops_calling_the_provider() {
    let provider = Arc::new(ScriptedProvider::always_fails("unreliable"));
    let server = TestServerBuilder::new()
        .with_provider(provider_entry("unreliable", "test-model", provider.clone()))
        .with_router_config(RouterConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                timeout: Duration::from_secs(60),
                min_requests: 1,
            },
            ..RouterConfig::default()
        })
        .start()
        .await;

    let request = openai_json_request("test-model", "Hello");

    // First two requests each reach the provider and fail, tripping the breaker.
    let first = server.post_json("/v1/chat/completions", &request).await;
    assert!(!first.status().is_success());
    let second = server.post_json("/v1/chat/completions", &request).await;
    assert!(!second.status().is_success());
    assert_eq!(provider.call_count(), 2);

    // The third request is rejected by the open circuit without reaching the provider.
    let third = server.post_json("/v1/chat/completions", &request).await;
    assert!(!third.status().is_success());
    assert_eq!(provider.call_count(), 2, "an open circuit must short-circuit before dispatching to the provider");
}

#[tokio::test]
async fn a_healthy_model_is_unaffected_by_another_models_open_circuit() {
    let flaky = Arc::new(ScriptedProvider::always_fails("flaky"));
    let healthy = Arc::new(ScriptedProvider::always_succeeds("healthy"));

    let server = TestServerBuilder::new()
        .with_provider(provider_entry("flaky", "flaky-model", flaky))
        .with_provider(provider_entry("healthy", "healthy-model", healthy))
        .with_router_config(RouterConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout: Duration::from_secs(60),
                min_requests: 1,
            },
            ..RouterConfig::default()
        })
        .start()
        .await;

    // Trip the circuit for flaky-model.
    let tripped = server.post_json("/v1/chat/completions", &openai_json_request("flaky-model", "Hello")).await;
    assert!(!tripped.status().is_success());

    // healthy-model keeps working regardless.
    assert_status(
        server.post_json("/v1/chat/completions", &openai_json_request("healthy-model", "Hello")).await,
        StatusCode::OK,
    )
    .await;
}

#[cfg(test)]
mod circuit_breaker_unit_tests {
    use gateway_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    #[test]
    fn half_open_probe_closes_the_circuit_on_success() {
        let breaker = CircuitBreaker::new(
            "p",
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout: Duration::from_millis(1),
                min_requests: 1,
            },
        );

        breaker.check().expect("closed circuit admits the first request");
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        breaker.check().expect("past the timeout, a half-open probe should be admitted");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_reopens_the_circuit_on_failure() {
        let breaker = CircuitBreaker::new(
            "p",
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout: Duration::from_millis(1),
                min_requests: 1,
            },
        );

        breaker.check().expect("closed circuit admits the first request");
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        breaker.check().expect("half-open probe admitted");
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn only_one_caller_is_admitted_to_the_half_open_probe() {
        let breaker = CircuitBreaker::new(
            "p",
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout: Duration::from_millis(1),
                min_requests: 1,
            },
        );
        breaker.check().expect("closed circuit admits the first request");
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        breaker.check().expect("first caller claims the half-open slot");
        assert!(breaker.check().is_err(), "a second concurrent caller must be rejected");
    }
}
