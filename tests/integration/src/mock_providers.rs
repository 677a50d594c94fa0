//! In-process provider test doubles.
//!
//! The gateway only ever talks to [`gateway_core::LLMProvider`] trait
//! objects, so these tests exercise the real dataplane against a
//! configurable in-process provider instead of mocking HTTP wire formats the
//! Azure/Bedrock adapters would never emit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use gateway_core::provider::{ChunkStream, ModelInfo};
use gateway_core::response::{Choice, FinishReason, ModelsResponse, Usage};
use gateway_core::streaming::{ChatChunk, ChunkChoice, ChunkDelta};
use gateway_core::{ChatMessage, GatewayError, GatewayRequest, GatewayResponse, GatewayResult, LLMProvider, ProviderType};
use parking_lot::Mutex;

/// What a call into [`ScriptedProvider`] should do.
#[derive(Clone)]
pub enum Behavior {
    /// Return a canned assistant message with the given token counts and cost.
    Complete {
        content: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost_usd: f64,
    },
    /// Emit a canned sequence of streaming chunks terminated by a finish reason.
    Stream { chunks: Vec<String>, cost_usd: f64 },
    /// Fail the call. `retryable` controls whether the Router retries against
    /// another candidate.
    Fail { message: String, retryable: bool, status_code: Option<u16> },
}

/// An [`LLMProvider`] whose behavior is scripted call-by-call.
///
/// Each call to `complete`/`complete_stream`/`embed` consumes the next queued
/// [`Behavior`]; once the queue is drained, the last behavior repeats. This
/// lets a test express "fail twice, then succeed" as
/// `ScriptedProvider::new("p", vec![Behavior::Fail{..}, Behavior::Fail{..}, Behavior::Complete{..}])`.
pub struct ScriptedProvider {
    id: String,
    provider_type: ProviderType,
    behaviors: Mutex<Vec<Behavior>>,
    call_count: AtomicUsize,
    healthy: std::sync::atomic::AtomicBool,
}

impl ScriptedProvider {
    /// A provider that always succeeds with a fixed canned response.
    #[must_use]
    pub fn always_succeeds(id: impl Into<String>) -> Self {
        Self::new(
            id,
            vec![Behavior::Complete {
                content: "scripted response".to_string(),
                prompt_tokens: 10,
                completion_tokens: 5,
                cost_usd: 0.001,
            }],
        )
    }

    /// A provider that always fails with a retryable provider error.
    #[must_use]
    pub fn always_fails(id: impl Into<String>) -> Self {
        Self::new(
            id,
            vec![Behavior::Fail {
                message: "upstream unavailable".to_string(),
                retryable: true,
                status_code: Some(503),
            }],
        )
    }

    /// Build a provider that works through `behaviors` in order, repeating
    /// the last one once exhausted.
    #[must_use]
    pub fn new(id: impl Into<String>, behaviors: Vec<Behavior>) -> Self {
        Self::with_type(id, ProviderType::AzureOpenAI, behaviors)
    }

    /// Like [`Self::new`] but with an explicit provider family.
    #[must_use]
    pub fn with_type(id: impl Into<String>, provider_type: ProviderType, behaviors: Vec<Behavior>) -> Self {
        Self {
            id: id.into(),
            provider_type,
            behaviors: Mutex::new(behaviors),
            call_count: AtomicUsize::new(0),
            healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Number of `complete`/`complete_stream`/`embed` calls observed so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Flip whether `health_probe` reports this provider as live.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn next_behavior(&self) -> Behavior {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut behaviors = self.behaviors.lock();
        if behaviors.len() > 1 {
            behaviors.remove(0)
        } else {
            behaviors.first().cloned().unwrap_or(Behavior::Fail {
                message: "no behavior scripted".to_string(),
                retryable: false,
                status_code: None,
            })
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        match self.next_behavior() {
            Behavior::Complete {
                content,
                prompt_tokens,
                completion_tokens,
                cost_usd,
            } => Ok(GatewayResponse {
                id: format!("resp-{}", uuid::Uuid::new_v4()),
                object: "chat.completion".to_string(),
                created: 0,
                model: request.model.clone(),
                provider: self.id.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: ChatMessage::assistant(content),
                    finish_reason: FinishReason::Stop,
                }],
                embeddings: Vec::new(),
                usage: Usage::new(prompt_tokens, completion_tokens, cost_usd),
                cache_hit: false,
            }),
            Behavior::Fail {
                message,
                retryable,
                status_code,
            } => Err(GatewayError::provider(&self.id, message, status_code, retryable)),
            Behavior::Stream { chunks, cost_usd } => Ok(GatewayResponse {
                id: format!("resp-{}", uuid::Uuid::new_v4()),
                object: "chat.completion".to_string(),
                created: 0,
                model: request.model.clone(),
                provider: self.id.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: ChatMessage::assistant(chunks.join("")),
                    finish_reason: FinishReason::Stop,
                }],
                embeddings: Vec::new(),
                usage: Usage::new(0, 0, cost_usd),
                cache_hit: false,
            }),
        }
    }

    async fn complete_stream(&self, request: &GatewayRequest) -> GatewayResult<ChunkStream> {
        let model = request.model.clone();
        match self.next_behavior() {
            Behavior::Stream { chunks, cost_usd } => {
                let id = format!("resp-{}", uuid::Uuid::new_v4());
                let last = chunks.len().saturating_sub(1);
                let usage = Usage::new(0, chunks.len() as u32, cost_usd);
                let items: Vec<GatewayResult<ChatChunk>> = chunks
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| {
                        Ok(ChatChunk {
                            id: id.clone(),
                            object: "chat.completion.chunk".to_string(),
                            created: 0,
                            model: model.clone(),
                            choices: vec![ChunkChoice {
                                index: 0,
                                delta: ChunkDelta {
                                    role: (i == 0).then(|| "assistant".to_string()),
                                    content: Some(text),
                                },
                                finish_reason: (i == last).then_some(FinishReason::Stop),
                            }],
                            usage: (i == last).then_some(usage),
                        })
                    })
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Behavior::Fail {
                message,
                retryable,
                status_code,
            } => Err(GatewayError::provider(&self.id, message, status_code, retryable)),
            Behavior::Complete { content, .. } => {
                let id = format!("resp-{}", uuid::Uuid::new_v4());
                let chunk = ChatChunk {
                    id,
                    object: "chat.completion.chunk".to_string(),
                    created: 0,
                    model,
                    choices: vec![ChunkChoice {
                        index: 0,
                        delta: ChunkDelta {
                            role: Some("assistant".to_string()),
                            content: Some(content),
                        },
                        finish_reason: Some(FinishReason::Stop),
                    }],
                    usage: Some(Usage::new(0, 1, 0.0)),
                };
                Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
            }
        }
    }

    async fn embed(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        match self.next_behavior() {
            Behavior::Fail {
                message,
                retryable,
                status_code,
            } => Err(GatewayError::provider(&self.id, message, status_code, retryable)),
            _ => Ok(GatewayResponse {
                id: format!("resp-{}", uuid::Uuid::new_v4()),
                object: "list".to_string(),
                created: 0,
                model: request.model.clone(),
                provider: self.id.clone(),
                choices: Vec::new(),
                embeddings: vec![vec![0.1, 0.2, 0.3, 0.4]],
                usage: Usage::new(4, 0, 0.0001),
                cache_hit: false,
            }),
        }
    }

    async fn list_models(&self) -> GatewayResult<ModelsResponse> {
        Ok(ModelsResponse::default())
    }

    async fn health_probe(&self) -> GatewayResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::provider_unavailable(format!("{} failed health probe", self.id)))
        }
    }
}

/// `ModelInfo` for a test model, tagged with a provider family so tests can
/// assert on which provider actually served a request.
#[must_use]
pub fn test_model_info(model_id: &str, provider: ProviderType) -> ModelInfo {
    ModelInfo {
        id: model_id.to_string(),
        provider,
        name: model_id.to_string(),
        capabilities: std::collections::HashSet::from([
            gateway_core::provider::ProviderCapabilities::Completion,
            gateway_core::provider::ProviderCapabilities::Embedding,
        ]),
        context_length: 8192,
        input_cost_per_1k: 0.01,
        output_cost_per_1k: 0.03,
    }
}

/// Convenience wrapper so callers can hand a [`ScriptedProvider`] to the
/// registry without an extra `Arc::new` at every call site.
#[must_use]
pub fn arc(provider: ScriptedProvider) -> Arc<dyn LLMProvider> {
    Arc::new(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GatewayRequest {
        GatewayRequest::builder()
            .model("test-model")
            .message(ChatMessage::user("hi"))
            .build()
            .expect("valid request")
    }

    #[tokio::test]
    async fn scripted_provider_repeats_last_behavior_after_queue_drains() {
        let provider = ScriptedProvider::new(
            "p",
            vec![
                Behavior::Fail {
                    message: "first try fails".to_string(),
                    retryable: true,
                    status_code: Some(503),
                },
                Behavior::Complete {
                    content: "ok".to_string(),
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    cost_usd: 0.0,
                },
            ],
        );

        let request = request();
        assert!(provider.complete(&request).await.is_err());
        assert!(provider.complete(&request).await.is_ok());
        assert!(provider.complete(&request).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn health_probe_reflects_set_healthy() {
        let provider = ScriptedProvider::always_succeeds("p");
        assert!(provider.health_probe().await.is_ok());
        provider.set_healthy(false);
        assert!(provider.health_probe().await.is_err());
    }
}
