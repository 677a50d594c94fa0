//! The provider adapter contract.
//!
//! A [`LLMProvider`] is a uniform capability over one upstream model API. The
//! set of concrete providers is closed and constructed by a factory keyed on
//! [`ProviderType`]; callers only ever see the trait object.

use crate::error::GatewayResult;
use crate::request::GatewayRequest;
use crate::response::{GatewayResponse, ModelsResponse};
use crate::streaming::ChatChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lazy, finite sequence of streaming chunks. Not restartable.
pub type ChunkStream = BoxStream<'static, GatewayResult<ChatChunk>>;

/// The set of upstream model providers this gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Azure OpenAI Service.
    AzureOpenAI,
    /// AWS Bedrock.
    Bedrock,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AzureOpenAI => write!(f, "azure_openai"),
            Self::Bedrock => write!(f, "bedrock"),
        }
    }
}

/// A capability a provider/model may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapabilities {
    /// Text completion / chat.
    Completion,
    /// Embeddings.
    Embedding,
    /// Vision (image) inputs.
    Vision,
    /// Code-specialized generation.
    Code,
    /// Tool/function calling.
    FunctionCalling,
}

/// Health of a provider as last observed by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Responding within latency thresholds.
    Healthy,
    /// Responding, but above the latency threshold.
    Degraded,
    /// Failed its last `N` consecutive probes.
    Unhealthy,
    /// Not yet probed.
    Unknown,
}

impl HealthStatus {
    /// Whether a provider in this state may still receive traffic.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded | Self::Unknown)
    }
}

/// Registry-level description of one model served by one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as used in requests.
    pub id: String,
    /// Provider serving this model.
    pub provider: ProviderType,
    /// Human-friendly display name.
    pub name: String,
    /// Capabilities this model supports.
    pub capabilities: HashSet<ProviderCapabilities>,
    /// Maximum context length in tokens.
    pub context_length: u32,
    /// USD cost per 1000 input tokens.
    pub input_cost_per_1k: f64,
    /// USD cost per 1000 output tokens.
    pub output_cost_per_1k: f64,
}

impl ModelInfo {
    /// Compute the USD cost of a completion given token counts.
    #[must_use]
    pub fn completion_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) / 1000.0) * self.input_cost_per_1k
            + (f64::from(completion_tokens) / 1000.0) * self.output_cost_per_1k
    }

    /// Compute the USD cost of an embedding call given total token count.
    #[must_use]
    pub fn embedding_cost(&self, total_tokens: u32) -> f64 {
        (f64::from(total_tokens) / 1000.0) * self.input_cost_per_1k
    }
}

/// Uniform capability over one upstream model-serving API.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stable identifier for this provider instance (e.g. `"azure-eastus"`).
    fn id(&self) -> &str;

    /// The provider family this adapter talks to.
    fn provider_type(&self) -> ProviderType;

    /// Perform a non-streaming completion.
    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse>;

    /// Perform a streaming completion. The returned stream is lazy: no
    /// upstream call is made until the first item is polled.
    async fn complete_stream(&self, request: &GatewayRequest) -> GatewayResult<ChunkStream>;

    /// Compute embeddings for a batch of input strings.
    async fn embed(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse>;

    /// List the models this provider currently serves.
    async fn list_models(&self) -> GatewayResult<ModelsResponse>;

    /// A cheap liveness probe used by the health checker.
    async fn health_probe(&self) -> GatewayResult<()>;
}
