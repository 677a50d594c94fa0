//! Azure OpenAI Service provider adapter.
//!
//! URL shape: `{resource}.openai.azure.com/openai/deployments/{deployment}/chat/completions`.
//! Authentication is a static API key in the `api-key` header; the deployment
//! name (not the model name) is what appears in the URL path, so requests are
//! routed by looking up the model id in the configured deployment map.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::provider::ChunkStream;
use gateway_core::request::{ContentPart, ImageDetail, ToolChoice};
use gateway_core::response::{Choice, GatewayResponse, ModelObject, ModelsResponse, Usage};
use gateway_core::streaming::{ChatChunk, ChunkChoice, ChunkDelta};
use gateway_core::{
    ChatMessage, FinishReason, GatewayError, GatewayRequest, GatewayResult, LLMProvider,
    MessageContent, MessageRole, ModelInfo, ProviderCapabilities, ProviderType,
};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Azure OpenAI REST API version understood by this adapter.
pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

/// Static configuration for one Azure OpenAI resource.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    /// Provider instance id, e.g. `"azure-eastus"`.
    pub id: String,
    /// API key for the resource.
    pub api_key: SecretString,
    /// Azure resource name (the `{resource}` in `{resource}.openai.azure.com`).
    pub resource_name: String,
    /// API version query parameter.
    pub api_version: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Deployment name -> model metadata. The deployment name is what Azure
    /// expects in the URL path; requests address models by `ModelInfo::id`.
    pub deployments: HashMap<String, ModelInfo>,
}

impl AzureOpenAiConfig {
    /// Start a configuration for a resource with one deployment.
    #[must_use]
    pub fn new(id: impl Into<String>, resource_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: SecretString::new(api_key.into()),
            resource_name: resource_name.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(120),
            deployments: HashMap::new(),
        }
    }

    /// Override the API version.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a deployment.
    #[must_use]
    pub fn with_deployment(mut self, deployment_name: impl Into<String>, model: ModelInfo) -> Self {
        self.deployments.insert(deployment_name.into(), model);
        self
    }

    fn base_url(&self) -> String {
        format!("https://{}.openai.azure.com", self.resource_name)
    }
}

/// Adapter for Azure OpenAI Service deployments.
pub struct AzureOpenAiProvider {
    config: AzureOpenAiConfig,
    client: Client,
    models: Vec<ModelInfo>,
}

impl AzureOpenAiProvider {
    /// Build a provider from a resource configuration.
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if no deployment is registered,
    /// or if the HTTP client cannot be built.
    pub fn new(config: AzureOpenAiConfig) -> GatewayResult<Self> {
        if config.deployments.is_empty() {
            return Err(GatewayError::Configuration {
                message: format!(
                    "Azure OpenAI provider '{}' has no deployments configured",
                    config.id
                ),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;

        let models = config.deployments.values().cloned().collect();

        Ok(Self {
            config,
            client,
            models,
        })
    }

    fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.base_url(),
            deployment,
            self.config.api_version
        )
    }

    fn deployment_for(&self, model: &str) -> GatewayResult<&str> {
        self.config
            .deployments
            .iter()
            .find(|(deployment, info)| deployment.as_str() == model || info.id == model)
            .map(|(deployment, _)| deployment.as_str())
            .ok_or_else(|| {
                GatewayError::ModelNotFound(format!(
                    "model '{model}' has no deployment on provider '{}'",
                    self.config.id
                ))
            })
    }

    fn model_info_for(&self, deployment: &str) -> Option<&ModelInfo> {
        self.config.deployments.get(deployment)
    }

    fn build_request_body(request: &GatewayRequest, stream: bool) -> AzureChatRequest {
        AzureChatRequest {
            messages: request.messages.iter().map(AzureMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stop: request.stop.clone(),
            stream,
            n: request.n,
            seed: request.seed,
            user: request.user.clone(),
            tool_choice: request.tool_choice.as_ref().map(|choice| match choice {
                ToolChoice::String(s) => serde_json::Value::String(s.clone()),
                ToolChoice::Tool { tool_type, function } => serde_json::json!({
                    "type": tool_type,
                    "function": { "name": function.name },
                }),
            }),
            response_format: request
                .response_format
                .as_ref()
                .map(|rf| serde_json::json!({ "type": rf.format_type })),
        }
    }

    fn map_error_status(&self, status: u16, body: &str) -> GatewayError {
        let parsed: Option<AzureErrorEnvelope> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.error.message.clone())
            .unwrap_or_else(|| body.to_string());
        let code = parsed.and_then(|e| e.error.code);

        match status {
            400 => GatewayError::validation(message, None::<String>, "azure_bad_request"),
            401 | 403 => GatewayError::authentication(message),
            404 if code.as_deref() == Some("DeploymentNotFound") => {
                GatewayError::ModelNotFound(message)
            }
            404 => GatewayError::ModelNotFound(message),
            429 => GatewayError::RateLimit {
                retry_after: Some(Duration::from_secs(60)),
                limit: None,
            },
            500..=599 => GatewayError::provider(&self.config.id, message, Some(status), true),
            _ => GatewayError::provider(&self.config.id, message, Some(status), false),
        }
    }
}

#[async_trait]
impl LLMProvider for AzureOpenAiProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureOpenAI
    }

    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        let deployment = self.deployment_for(&request.model)?.to_string();
        let url = self.completions_url(&deployment);
        let body = Self::build_request_body(request, false);

        debug!(provider = %self.config.id, deployment = %deployment, "sending Azure OpenAI completion");

        let response = self
            .client
            .post(&url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("request failed: {e}"), None, true))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_error_status(status.as_u16(), &text));
        }

        let parsed: AzureChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("invalid response body: {e}"), None, false))?;

        let model_info = self.model_info_for(&deployment);
        let cost = model_info.map_or(0.0, |m| {
            m.completion_cost(parsed.usage.prompt_tokens, parsed.usage.completion_tokens)
        });

        Ok(GatewayResponse {
            id: parsed.id,
            object: "chat.completion".to_string(),
            created: parsed.created,
            model: request.model.clone(),
            provider: self.config.id.clone(),
            choices: parsed
                .choices
                .into_iter()
                .map(|c| Choice {
                    index: c.index,
                    message: c.message.into(),
                    finish_reason: map_finish_reason(c.finish_reason.as_deref()),
                })
                .collect(),
            embeddings: Vec::new(),
            usage: Usage::new(parsed.usage.prompt_tokens, parsed.usage.completion_tokens, cost),
            cache_hit: false,
        })
    }

    async fn complete_stream(&self, request: &GatewayRequest) -> GatewayResult<ChunkStream> {
        let deployment = self.deployment_for(&request.model)?.to_string();
        let url = self.completions_url(&deployment);
        let body = Self::build_request_body(request, true);
        let provider_id = self.config.id.clone();
        let model = request.model.clone();

        let request_builder = self
            .client
            .post(&url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| GatewayError::provider(&provider_id, format!("failed to open stream: {e}"), None, true))?;

        let stream = try_stream! {
            let mut es = event_source;
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => trace!(provider = %provider_id, "Azure stream opened"),
                    Ok(Event::Message(msg)) => {
                        let data = msg.data.trim();
                        if data == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<AzureChatChunk>(data) {
                            Ok(chunk) => yield convert_chunk(chunk, &model),
                            Err(e) => warn!(provider = %provider_id, error = %e, "unparseable Azure chunk"),
                        }
                    }
                    Err(e) => {
                        Err(GatewayError::Streaming(format!("Azure stream error: {e}")))?;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        let deployment = self.deployment_for(&request.model)?.to_string();
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.config.base_url(),
            deployment,
            self.config.api_version
        );

        let input: Vec<String> = request
            .messages
            .iter()
            .filter_map(|m| m.text_content().map(str::to_string))
            .collect();

        let response = self
            .client
            .post(&url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("request failed: {e}"), None, true))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_error_status(status.as_u16(), &text));
        }

        let parsed: AzureEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("invalid response body: {e}"), None, false))?;

        let model_info = self.model_info_for(&deployment);
        let cost = model_info.map_or(0.0, |m| m.embedding_cost(parsed.usage.total_tokens));

        Ok(GatewayResponse {
            id: uuid::Uuid::new_v4().to_string(),
            object: "list".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request.model.clone(),
            provider: self.config.id.clone(),
            choices: Vec::new(),
            embeddings: parsed.data.into_iter().map(|d| d.embedding).collect(),
            usage: Usage::new(parsed.usage.prompt_tokens, 0, cost),
            cache_hit: false,
        })
    }

    async fn list_models(&self) -> GatewayResult<ModelsResponse> {
        Ok(ModelsResponse {
            object: "list".to_string(),
            data: self
                .models
                .iter()
                .map(|m| ModelObject {
                    id: m.id.clone(),
                    object: "model".to_string(),
                    created: 0,
                    owned_by: self.config.id.clone(),
                })
                .collect(),
        })
    }

    async fn health_probe(&self) -> GatewayResult<()> {
        let Some(deployment) = self.config.deployments.keys().next() else {
            return Err(GatewayError::ProviderUnavailable(self.config.id.clone()));
        };
        let url = self.completions_url(deployment);

        let response = self
            .client
            .post(&url)
            .header("api-key", self.config.api_key.expose_secret())
            .timeout(Duration::from_secs(10))
            .json(&serde_json::json!({
                "messages": [{"role": "user", "content": "ping"}],
                "max_tokens": 1,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(format!("{}: {e}", self.config.id)))?;

        if response.status().is_success() || response.status().as_u16() == 429 {
            Ok(())
        } else {
            Err(GatewayError::ProviderUnavailable(format!(
                "{}: probe returned {}",
                self.config.id,
                response.status()
            )))
        }
    }
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn convert_chunk(chunk: AzureChatChunk, model: &str) -> ChatChunk {
    ChatChunk {
        id: chunk.id,
        object: "chat.completion.chunk".to_string(),
        created: chunk.created,
        model: model.to_string(),
        choices: chunk
            .choices
            .into_iter()
            .map(|c| ChunkChoice {
                index: c.index,
                delta: ChunkDelta {
                    role: c.delta.role,
                    content: c.delta.content,
                },
                finish_reason: c.finish_reason.as_deref().map(|r| map_finish_reason(Some(r))),
            })
            .collect(),
        usage: None,
    }
}

#[derive(Debug, Serialize)]
struct AzureChatRequest {
    messages: Vec<AzureMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AzureMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&ChatMessage> for AzureMessage {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        let content = match &msg.content {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Parts(parts) => Some(flatten_parts(parts)),
        };
        Self {
            role: role.to_string(),
            content,
            name: msg.name.clone(),
        }
    }
}

impl From<AzureMessage> for ChatMessage {
    fn from(msg: AzureMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        };
        Self {
            role,
            content: MessageContent::Text(msg.content.unwrap_or_default()),
            name: msg.name,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

fn flatten_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.clone()),
            ContentPart::ImageUrl { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[allow(dead_code)]
fn image_detail_str(detail: ImageDetail) -> &'static str {
    match detail {
        ImageDetail::Auto => "auto",
        ImageDetail::Low => "low",
        ImageDetail::High => "high",
    }
}

#[derive(Debug, Deserialize)]
struct AzureChatResponse {
    id: String,
    created: i64,
    choices: Vec<AzureChoice>,
    usage: AzureUsage,
}

#[derive(Debug, Deserialize)]
struct AzureChoice {
    index: u32,
    message: AzureMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AzureChatChunk {
    id: String,
    created: i64,
    choices: Vec<AzureChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct AzureChunkChoice {
    index: u32,
    delta: AzureChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureChunkDelta {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingData>,
    usage: AzureEmbeddingUsage,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AzureErrorEnvelope {
    error: AzureErrorBody,
}

#[derive(Debug, Deserialize)]
struct AzureErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
