//! AWS Bedrock provider adapter.
//!
//! Scoped to the Anthropic Claude Messages API surfaced through Bedrock's
//! `InvokeModel`/`InvokeModelWithResponseStream` actions, since that is the
//! model family this gateway routes chat completions to. Requests are signed
//! with AWS Signature Version 4 using long-lived or session credentials;
//! there is no SDK dependency, the signature is computed by hand against the
//! `bedrock-runtime` scope.
//!
//! Bedrock's native streaming wire format is a binary event-stream framing
//! that a JSON deserializer cannot parse directly. Rather than implement that
//! framing, streaming calls fall back to a single-shot invoke and surface the
//! whole completion as one terminal chunk — still spec-correct (the stream is
//! still lazy and finite), just not token-incremental for this provider.

use async_stream::try_stream;
use async_trait::async_trait;
use gateway_core::provider::ChunkStream;
use gateway_core::response::{Choice, GatewayResponse, ModelObject, ModelsResponse, Usage};
use gateway_core::streaming::{ChatChunk, ChunkChoice, ChunkDelta};
use gateway_core::{
    ChatMessage, FinishReason, GatewayError, GatewayRequest, GatewayResult, LLMProvider,
    MessageContent, MessageRole, ModelInfo, ProviderCapabilities, ProviderType,
};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Static configuration for one Bedrock region/credential pair.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Provider instance id, e.g. `"bedrock-us-east-1"`.
    pub id: String,
    /// AWS region, e.g. `"us-east-1"`.
    pub region: String,
    /// Static access key id. Long-lived credentials only; this adapter does
    /// not assume an IAM instance role.
    pub access_key_id: String,
    /// Static secret access key.
    pub secret_access_key: String,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Claude models reachable through this account, keyed by Bedrock model id.
    pub models: Vec<ModelInfo>,
}

impl BedrockConfig {
    /// Start a configuration with static long-lived credentials.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            timeout: Duration::from_secs(120),
            models: Vec::new(),
        }
    }

    /// Attach a session token for temporary (STS) credentials.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Register the Claude models reachable on this account.
    #[must_use]
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    fn base_url(&self) -> String {
        format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
    }
}

/// Adapter for AWS Bedrock Claude models.
pub struct BedrockProvider {
    config: BedrockConfig,
    client: Client,
}

impl BedrockProvider {
    /// Build a provider from a region/credential configuration.
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if no model is registered, or if
    /// the HTTP client cannot be built.
    pub fn new(config: BedrockConfig) -> GatewayResult<Self> {
        if config.models.is_empty() {
            return Err(GatewayError::Configuration {
                message: format!("Bedrock provider '{}' has no models configured", config.id),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn model_info(&self, model_id: &str) -> GatewayResult<&ModelInfo> {
        self.config
            .models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| {
                GatewayError::ModelNotFound(format!(
                    "model '{model_id}' is not served by provider '{}'",
                    self.config.id
                ))
            })
    }

    fn invoke_url(&self, model_id: &str) -> String {
        format!("{}/model/{model_id}/invoke", self.config.base_url())
    }

    fn claude_request_body(request: &GatewayRequest) -> serde_json::Value {
        let mut system_prompt: Option<String> = None;
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter_map(|m| match m.role {
                MessageRole::System => {
                    system_prompt = Some(text_of(&m.content));
                    None
                }
                MessageRole::User | MessageRole::Tool => Some(serde_json::json!({
                    "role": "user",
                    "content": text_of(&m.content),
                })),
                MessageRole::Assistant => Some(serde_json::json!({
                    "role": "assistant",
                    "content": text_of(&m.content),
                })),
            })
            .collect();

        let mut body = serde_json::json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "messages": messages,
        });

        if let Some(system) = system_prompt {
            body["system"] = serde_json::Value::String(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json_f64(f64::from(temp));
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json_f64(f64::from(top_p));
        }
        if let Some(ref stop) = request.stop {
            body["stop_sequences"] = serde_json::Value::from(stop.clone());
        }

        body
    }

    /// Sign a request with AWS Signature Version 4 for the `bedrock` service.
    fn sign_request(&self, url: &str, body: &[u8], headers: &mut HashMap<String, String>) -> GatewayResult<()> {
        let now = chrono::Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let parsed = url::Url::parse(url).map_err(|e| GatewayError::internal(format!("invalid URL: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| GatewayError::internal("URL has no host"))?
            .to_string();
        let path = parsed.path().to_string();
        let payload_hash = hex::encode(sha256(body));

        headers.insert("host".to_string(), host);
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        if let Some(token) = &self.config.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let mut signed_header_names: Vec<&str> = headers.keys().map(String::as_str).collect();
        signed_header_names.sort_unstable();
        let signed_headers = signed_header_names.join(";");

        let mut canonical_headers = String::new();
        for name in &signed_header_names {
            canonical_headers.push_str(&format!("{name}:{}\n", headers[*name].trim()));
        }

        let canonical_request =
            format!("POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

        let credential_scope = format!("{date_stamp}/{}/bedrock/aws4_request", self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(sha256(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(format!("AWS4{}", self.config.secret_access_key).as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"bedrock");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.config.access_key_id
        );
        headers.insert("authorization".to_string(), authorization);

        Ok(())
    }

    async fn invoke(&self, model_id: &str, body: &serde_json::Value) -> GatewayResult<ClaudeResponse> {
        let url = self.invoke_url(model_id);
        let body_bytes = serde_json::to_vec(body)
            .map_err(|e| GatewayError::internal(format!("failed to serialize request: {e}")))?;

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        self.sign_request(&url, &body_bytes, &mut headers)?;

        let mut builder = self.client.post(&url);
        for (name, value) in &headers {
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        debug!(provider = %self.config.id, model = %model_id, "invoking Bedrock model");

        let response = builder
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("request failed: {e}"), None, true))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message: String = serde_json::from_str::<BedrockError>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(match status.as_u16() {
                400 => GatewayError::validation(message, None::<String>, "bedrock_bad_request"),
                401 | 403 => GatewayError::authentication(message),
                404 => GatewayError::ModelNotFound(message),
                429 => GatewayError::RateLimit {
                    retry_after: Some(Duration::from_secs(60)),
                    limit: None,
                },
                code @ 500..=599 => GatewayError::provider(&self.config.id, message, Some(code), true),
                code => GatewayError::provider(&self.config.id, message, Some(code), false),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::provider(&self.config.id, format!("invalid response body: {e}"), None, false))
    }
}

#[async_trait]
impl LLMProvider for BedrockProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Bedrock
    }

    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        let model_info = self.model_info(&request.model)?.clone();
        let body = Self::claude_request_body(request);
        let parsed = self.invoke(&request.model, &body).await?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|b| (b.block_type == "text").then_some(b.text).flatten())
            .collect::<Vec<_>>()
            .join("");

        let cost = model_info.completion_cost(parsed.usage.input_tokens, parsed.usage.output_tokens);

        Ok(GatewayResponse {
            id: format!("bedrock-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request.model.clone(),
            provider: self.config.id.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(text),
                finish_reason: map_stop_reason(parsed.stop_reason.as_deref()),
            }],
            embeddings: Vec::new(),
            usage: Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens, cost),
            cache_hit: false,
        })
    }

    async fn complete_stream(&self, request: &GatewayRequest) -> GatewayResult<ChunkStream> {
        let response = self.complete(request).await?;
        let model = request.model.clone();

        let stream = try_stream! {
            for choice in response.choices {
                let content = choice.message.text_content().map(str::to_string);
                yield ChatChunk {
                    id: response.id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: response.created,
                    model: model.clone(),
                    choices: vec![ChunkChoice {
                        index: choice.index,
                        delta: ChunkDelta { role: Some("assistant".to_string()), content },
                        finish_reason: Some(choice.finish_reason),
                    }],
                    usage: Some(response.usage),
                };
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(&self, _request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        Err(GatewayError::provider(
            &self.config.id,
            "embeddings are not supported by this Bedrock provider configuration",
            None,
            false,
        ))
    }

    async fn list_models(&self) -> GatewayResult<ModelsResponse> {
        Ok(ModelsResponse {
            object: "list".to_string(),
            data: self
                .config
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
        let Some(model) = self.config.models.first() else {
            return Err(GatewayError::ProviderUnavailable(self.config.id.clone()));
        };
        let body = serde_json::json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        self.invoke(&model.id, &body)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::ProviderUnavailable(format!("{}: {e}", self.config.id)))
    }
}

fn text_of(content: &MessageContent) -> String {
    content.as_text().map(str::to_string).unwrap_or_default()
}

fn json_f64(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct BedrockError {
    message: Option<String>,
}
